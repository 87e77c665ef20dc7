//! Equality and range cursors over a `LinearHashIndex`.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use crate::error::Result;
use crate::hash::KeyKind;
use crate::index::LinearHashIndex;
use crate::overflow::OverflowFile;
use crate::record::{Layout, RecordRef};

/// Orders two key byte-strings according to how the index interprets
/// them. Integer keys compare numerically; byte-string keys compare
/// lexicographically (their hash is not order-preserving, only their raw
/// bytes are meaningful for range comparison).
pub fn compare_keys(kind: KeyKind, a: &[u8], b: &[u8]) -> Ordering {
    match kind {
        KeyKind::Bytes => a.cmp(b),
        KeyKind::Unsigned => {
            let to_u64 = |k: &[u8]| {
                let mut buf = [0u8; 8];
                let n = k.len().min(8);
                buf[..n].copy_from_slice(&k[..n]);
                u64::from_ne_bytes(buf)
            };
            to_u64(a).cmp(&to_u64(b))
        }
        KeyKind::Signed => {
            let to_i64 = |k: &[u8]| {
                let mut buf = [0u8; 8];
                let n = k.len().min(8);
                buf[..n].copy_from_slice(&k[..n]);
                i64::from_ne_bytes(buf)
            };
            to_i64(a).cmp(&to_i64(b))
        }
    }
}

/// A trait callers can implement to override key ordering, for key types
/// this crate doesn't interpret natively.
pub trait KeyCompare {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

struct DefaultKeyCompare(KeyKind);

impl KeyCompare for DefaultKeyCompare {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        compare_keys(self.0, a, b)
    }
}

/// What a cursor selects.
pub enum Predicate {
    Equality(Vec<u8>),
    /// Inclusive bounds; `None` on either side means unbounded.
    Range { low: Option<Vec<u8>>, high: Option<Vec<u8>> },
}

impl Predicate {
    fn matches(&self, key: &[u8], cmp: &dyn KeyCompare) -> bool {
        match self {
            Predicate::Equality(target) => key == target.as_slice(),
            Predicate::Range { low, high } => {
                let above_low = low.as_ref().map_or(true, |l| cmp.compare(key, l) != Ordering::Less);
                let below_high =
                    high.as_ref().map_or(true, |h| cmp.compare(key, h) != Ordering::Greater);
                above_low && below_high
            }
        }
    }

    /// True once `key` is strictly past the predicate's upper bound, so an
    /// ordered scan can stop early. For an equality predicate the target
    /// key is its own upper bound: once an ordered chain yields a key past
    /// it, no further match can appear.
    fn passed_upper(&self, key: &[u8], cmp: &dyn KeyCompare) -> bool {
        match self {
            Predicate::Equality(target) => cmp.compare(key, target) == Ordering::Greater,
            Predicate::Range { high, .. } => {
                high.as_ref().is_some_and(|h| cmp.compare(key, h) == Ordering::Greater)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialised,
    Active,
    EndOfResults,
}

/// Per-bucket scan progress: which primary-page slot we're on, and
/// whether/which overflow file is currently open.
struct BucketScan {
    bucket_id: u64,
    primary_index: usize,
    overflow: Option<OverflowFile>,
    overflow_done: bool,
}

pub struct Cursor {
    file: File,
    layout: Layout,
    records_per_bucket: usize,
    bucket_bytes: usize,
    bucket_count: u64,
    directory: PathBuf,
    map_id: u64,
    ordered_overflow: bool,
    key_kind: KeyKind,
    predicate: Predicate,
    state: State,
    /// `true` for an equality cursor: exactly one bucket is ever visited.
    single_bucket: bool,
    first_bucket: u64,
    scan: Option<BucketScan>,
}

impl Cursor {
    pub(crate) fn new(index: &LinearHashIndex, predicate: Predicate) -> Result<Cursor> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .open(index.directory().join(format!("{}_lh_main.bin", index.id())))?;
        let single_bucket = matches!(predicate, Predicate::Equality(_));
        let first_bucket = match &predicate {
            Predicate::Equality(key) => index.resolve_bucket(key),
            Predicate::Range { .. } => 0,
        };
        Ok(Cursor {
            file,
            layout: index.layout(),
            records_per_bucket: index.records_per_bucket(),
            bucket_bytes: index.bucket_bytes(),
            bucket_count: index.bucket_count(),
            directory: index.directory().to_path_buf(),
            map_id: index.id(),
            ordered_overflow: index.ordered_overflow(),
            key_kind: index.key_kind(),
            predicate,
            state: State::Uninitialised,
            single_bucket,
            first_bucket,
            scan: None,
        })
    }

    fn cmp(&self) -> DefaultKeyCompare {
        DefaultKeyCompare(self.key_kind)
    }

    fn read_page(&mut self, bucket_id: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.bucket_bytes];
        self.file.seek(SeekFrom::Start(bucket_id * self.bucket_bytes as u64))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn start_bucket(&mut self, bucket_id: u64) {
        self.scan = Some(BucketScan { bucket_id, primary_index: 0, overflow: None, overflow_done: false });
    }

    fn advance_bucket(&mut self) -> bool {
        if self.single_bucket {
            return false;
        }
        let current = self.scan.as_ref().map(|s| s.bucket_id).unwrap_or(self.first_bucket);
        let next = (current + 1) % self.bucket_count;
        if next == self.first_bucket {
            return false;
        }
        self.start_bucket(next);
        true
    }

    /// Returns the next matching `(key, value)` pair, or `None` once the
    /// cursor is exhausted.
    pub fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.state == State::EndOfResults {
            return Ok(None);
        }
        if self.state == State::Uninitialised {
            self.start_bucket(self.first_bucket);
            self.state = State::Active;
        }

        loop {
            let bucket_id = match &self.scan {
                Some(s) => s.bucket_id,
                None => {
                    self.state = State::EndOfResults;
                    return Ok(None);
                }
            };
            let page = self.read_page(bucket_id)?;
            let record_bytes = self.layout.record_bytes();

            while self.scan.as_ref().unwrap().primary_index < self.records_per_bucket {
                let i = self.scan.as_ref().unwrap().primary_index;
                self.scan.as_mut().unwrap().primary_index += 1;
                let slot = &page[i * record_bytes..(i + 1) * record_bytes];
                let rec = RecordRef::new(self.layout, slot);
                if !rec.is_in_use() {
                    continue;
                }
                let cmp = self.cmp();
                if self.predicate.matches(rec.key(), &cmp) {
                    return Ok(Some((rec.key().to_vec(), rec.value().to_vec())));
                }
            }

            if !self.scan.as_ref().unwrap().overflow_done {
                if self.scan.as_ref().unwrap().overflow.is_none() {
                    if OverflowFile::exists(&self.directory, self.map_id, bucket_id) {
                        let ovf = OverflowFile::open_or_create(
                            &self.directory,
                            self.map_id,
                            bucket_id,
                            self.layout,
                        )?;
                        self.scan.as_mut().unwrap().overflow = Some(ovf);
                    } else {
                        self.scan.as_mut().unwrap().overflow_done = true;
                    }
                }
                if let Some(ovf) = self.scan.as_mut().unwrap().overflow.as_mut() {
                    while let Some(rec) = ovf.next()? {
                        let cmp = self.cmp();
                        if self.ordered_overflow && self.predicate.passed_upper(&rec.key, &cmp) {
                            break;
                        }
                        if self.predicate.matches(&rec.key, &cmp) {
                            return Ok(Some((rec.key, rec.value)));
                        }
                    }
                    self.scan.as_mut().unwrap().overflow_done = true;
                }
            }

            if !self.advance_bucket() {
                self.state = State::EndOfResults;
                return Ok(None);
            }
        }
    }

    pub fn close(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexParams, LinearHashIndex, WriteConcern};
    use tempfile::tempdir;

    fn params(dir: &std::path::Path, ordered: bool) -> IndexParams {
        IndexParams {
            id: 1,
            key_kind: KeyKind::Unsigned,
            key_size: 4,
            value_size: 4,
            records_per_bucket: 2,
            initial_buckets: 4,
            write_concern: WriteConcern::InsertUnique,
            directory: dir.to_path_buf(),
            ordered_overflow: ordered,
            hash_fn: None,
        }
    }

    #[test]
    fn equality_cursor_finds_single_key() {
        let dir = tempdir().unwrap();
        let mut idx = LinearHashIndex::create(params(dir.path(), false)).unwrap();
        idx.insert(&1u32.to_ne_bytes(), &10u32.to_ne_bytes()).unwrap();
        idx.insert(&2u32.to_ne_bytes(), &20u32.to_ne_bytes()).unwrap();

        let mut cursor = idx.find(Predicate::Equality(2u32.to_ne_bytes().to_vec())).unwrap();
        let (k, v) = cursor.next().unwrap().unwrap();
        assert_eq!(k, 2u32.to_ne_bytes());
        assert_eq!(v, 20u32.to_ne_bytes());
        assert!(cursor.next().unwrap().is_none());
    }

    #[test]
    fn range_cursor_visits_every_bucket() {
        let dir = tempdir().unwrap();
        let mut idx = LinearHashIndex::create(params(dir.path(), false)).unwrap();
        for k in 0u32..4 {
            idx.insert(&k.to_ne_bytes(), &(k * 10).to_ne_bytes()).unwrap();
        }

        let mut cursor = idx.find(Predicate::Range { low: None, high: None }).unwrap();
        let mut found = Vec::new();
        while let Some((k, _)) = cursor.next().unwrap() {
            found.push(u32::from_ne_bytes(k.try_into().unwrap()));
        }
        found.sort();
        assert_eq!(found, vec![0, 1, 2, 3]);
    }

    #[test]
    fn range_cursor_respects_bounds() {
        let dir = tempdir().unwrap();
        let mut idx = LinearHashIndex::create(params(dir.path(), false)).unwrap();
        for k in 0u32..4 {
            idx.insert(&k.to_ne_bytes(), &(k * 10).to_ne_bytes()).unwrap();
        }

        let mut cursor = idx
            .find(Predicate::Range {
                low: Some(1u32.to_ne_bytes().to_vec()),
                high: Some(2u32.to_ne_bytes().to_vec()),
            })
            .unwrap();
        let mut found = Vec::new();
        while let Some((k, _)) = cursor.next().unwrap() {
            found.push(u32::from_ne_bytes(k.try_into().unwrap()));
        }
        found.sort();
        assert_eq!(found, vec![1, 2]);
    }
}
