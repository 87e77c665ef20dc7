//! Operation and split engines: the `LinearHashIndex` handle that ties the
//! record codec, overflow files, page cache, and hash engine together into
//! insert/update/query/delete and the incremental split protocol.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};

use crate::cache::{FlushMode, PageCache};
use crate::error::{LinHashError, Result};
use crate::hash::{self, HashFn, HashPair, KeyKind};
use crate::overflow::OverflowFile;
use crate::record::{Layout, RecordMut, RecordRef, Status};

/// Whether a duplicate key on insert is rejected or silently overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteConcern {
    InsertUnique,
    UpdateOrInsert,
}

/// Open-time configuration. These values are supplied by the caller (the
/// facade that would otherwise own a config file); this crate treats them
/// as plain constructor arguments.
#[derive(Clone)]
pub struct IndexParams {
    pub id: u64,
    pub key_kind: KeyKind,
    pub key_size: usize,
    pub value_size: usize,
    pub records_per_bucket: usize,
    /// N0: must be a power of two >= 2.
    pub initial_buckets: u64,
    pub write_concern: WriteConcern,
    /// Directory holding `<id>_lh_main.bin` and every `<id>_<bucket>.ovf`.
    pub directory: PathBuf,
    /// When true, overflow chains are kept key-sorted so range scans can
    /// stop as soon as they pass the upper bound within one chain.
    pub ordered_overflow: bool,
    /// Overrides the `key_kind`-driven reduction entirely when set.
    /// Required in practice for any key shape other than a host-word
    /// integer or a byte string `key_kind` alone can't express.
    pub hash_fn: Option<HashFn>,
}

impl std::fmt::Debug for IndexParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexParams")
            .field("id", &self.id)
            .field("key_kind", &self.key_kind)
            .field("key_size", &self.key_size)
            .field("value_size", &self.value_size)
            .field("records_per_bucket", &self.records_per_bucket)
            .field("initial_buckets", &self.initial_buckets)
            .field("write_concern", &self.write_concern)
            .field("directory", &self.directory)
            .field("ordered_overflow", &self.ordered_overflow)
            .field("hash_fn", &self.hash_fn.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

impl IndexParams {
    fn layout(&self) -> Layout {
        Layout::new(self.key_size, self.value_size)
    }

    fn main_path(&self) -> PathBuf {
        self.directory.join(format!("{}_lh_main.bin", self.id))
    }
}

/// File level and split pointer, the only state that must survive a
/// restart; everything else in `IndexParams` is reconstructed by the
/// caller from its own configuration store.
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistedState {
    pub level: u32,
    pub split_pointer: u64,
}

/// Where an `insert` landed, so callers can implement a split-after-
/// overflow policy without the index forcing one on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    InsertedInPrimary,
    InsertedInOverflow,
    Updated,
}

pub struct LinearHashIndex {
    params: IndexParams,
    layout: Layout,
    main_file: File,
    cache: PageCache,
    level: u32,
    split_pointer: u64,
}

fn is_power_of_two_at_least_two(n: u64) -> bool {
    n >= 2 && n & (n - 1) == 0
}

impl LinearHashIndex {
    /// Creates a fresh index: a main file containing `initial_buckets`
    /// empty primary pages, level 0, split pointer 0.
    pub fn create(params: IndexParams) -> Result<LinearHashIndex> {
        if !is_power_of_two_at_least_two(params.initial_buckets) {
            return Err(LinHashError::InvalidInitialSize(params.initial_buckets));
        }
        let layout = params.layout();
        let bucket_bytes = params.records_per_bucket * layout.record_bytes();
        let main_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(params.main_path())?;
        main_file.set_len(params.initial_buckets * bucket_bytes as u64)?;
        debug!(
            "created linear hash index {} with {} initial buckets of {} bytes each",
            params.id, params.initial_buckets, bucket_bytes
        );
        let cache = PageCache::new(2, bucket_bytes);
        Ok(LinearHashIndex { params, layout, main_file, cache, level: 0, split_pointer: 0 })
    }

    /// Reopens an index whose main file already exists, restoring the
    /// level/split-pointer state the caller persisted from a prior
    /// `snapshot_metadata()`.
    pub fn open(params: IndexParams, state: PersistedState) -> Result<LinearHashIndex> {
        let layout = params.layout();
        let bucket_bytes = params.records_per_bucket * layout.record_bytes();
        let main_path = params.main_path();
        if !main_path.exists() {
            return Err(LinHashError::Uninitialized(params.id));
        }
        let main_file = OpenOptions::new().read(true).write(true).open(main_path)?;
        let cache = PageCache::new(2, bucket_bytes);
        Ok(LinearHashIndex {
            params,
            layout,
            main_file,
            cache,
            level: state.level,
            split_pointer: state.split_pointer,
        })
    }

    pub fn close(self) -> Result<()> {
        Ok(())
    }

    /// Removes the main file and every overflow file for this index's id.
    /// Overflow files are enumerated by directory listing rather than by
    /// iterating `0..bucket_count`, so files left behind by buckets the
    /// caller never reopened are still cleaned up. Best-effort: continues
    /// past individual failures and reports the last one.
    pub fn destroy(self) -> Result<()> {
        let prefix = format!("{}_", self.params.id);
        let mut last_error: Option<String> = None;
        if let Ok(entries) = std::fs::read_dir(&self.params.directory) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with(&prefix) && name.ends_with(".ovf") {
                    if let Err(e) = std::fs::remove_file(entry.path()) {
                        warn!("failed removing overflow file {name}: {e}");
                        last_error = Some(e.to_string());
                    }
                }
            }
        }
        let main_path = self.params.main_path();
        if let Err(e) = std::fs::remove_file(&main_path) {
            last_error = Some(e.to_string());
        }
        match last_error {
            Some(last_error) => Err(LinHashError::DestructionError { map_id: self.params.id, last_error }),
            None => Ok(()),
        }
    }

    pub fn bucket_count(&self) -> u64 {
        (self.params.initial_buckets << self.level) + self.split_pointer
    }

    pub fn snapshot_metadata(&self) -> PersistedState {
        PersistedState { level: self.level, split_pointer: self.split_pointer }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn key_kind(&self) -> KeyKind {
        self.params.key_kind
    }

    pub(crate) fn bucket_bytes(&self) -> usize {
        self.params.records_per_bucket * self.layout.record_bytes()
    }

    pub(crate) fn directory(&self) -> &Path {
        &self.params.directory
    }

    pub(crate) fn id(&self) -> u64 {
        self.params.id
    }

    pub(crate) fn ordered_overflow(&self) -> bool {
        self.params.ordered_overflow
    }

    pub(crate) fn records_per_bucket(&self) -> usize {
        self.params.records_per_bucket
    }

    fn hash_pair(&self, key: &[u8]) -> HashPair {
        hash::compute(
            self.params.key_kind,
            key,
            self.params.initial_buckets,
            self.level,
            self.params.hash_fn.as_ref(),
        )
    }

    fn bucket_for(&self, key: &[u8]) -> u64 {
        hash::resolve_bucket(self.hash_pair(key), self.split_pointer)
    }

    pub(crate) fn resolve_bucket(&self, key: &[u8]) -> u64 {
        self.bucket_for(key)
    }

    /// Opens a cursor over this index for the given predicate.
    pub fn find(&self, predicate: crate::cursor::Predicate) -> Result<crate::cursor::Cursor> {
        crate::cursor::Cursor::new(self, predicate)
    }

    fn open_overflow(&self, bucket_id: u64) -> Result<OverflowFile> {
        OverflowFile::open_or_create(&self.params.directory, self.params.id, bucket_id, self.layout)
    }

    fn overflow_exists(&self, bucket_id: u64) -> bool {
        OverflowFile::exists(&self.params.directory, self.params.id, bucket_id)
    }

    /// Scans a primary page buffer for a live record with `key`.
    fn find_in_page(&self, buffer: &[u8], key: &[u8]) -> Option<usize> {
        let record_bytes = self.layout.record_bytes();
        for i in 0..self.params.records_per_bucket {
            let slot = &buffer[i * record_bytes..(i + 1) * record_bytes];
            let rec = RecordRef::new(self.layout, slot);
            if rec.is_in_use() && rec.key() == key {
                return Some(i);
            }
        }
        None
    }

    /// First `Empty` or `Deleted` slot in a primary page buffer.
    fn find_free_in_page(&self, buffer: &[u8]) -> Option<usize> {
        let record_bytes = self.layout.record_bytes();
        for i in 0..self.params.records_per_bucket {
            let slot = &buffer[i * record_bytes..(i + 1) * record_bytes];
            let rec = RecordRef::new(self.layout, slot);
            if rec.status() != Status::InUse {
                return Some(i);
            }
        }
        None
    }

    fn slot_mut(buffer: &mut [u8], layout: Layout, index: usize) -> RecordMut<'_> {
        let record_bytes = layout.record_bytes();
        RecordMut::new(layout, &mut buffer[index * record_bytes..(index + 1) * record_bytes])
    }

    pub fn query(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        let bucket = self.bucket_for(key);
        self.cache.load(0, bucket, &mut self.main_file)?;
        let buffer = self.cache.buffer(0)?;
        if let Some(i) = self.find_in_page(buffer, key) {
            let record_bytes = self.layout.record_bytes();
            let slot = &buffer[i * record_bytes..(i + 1) * record_bytes];
            return Ok(RecordRef::new(self.layout, slot).value().to_vec());
        }
        if self.overflow_exists(bucket) {
            let mut ovf = self.open_overflow(bucket)?;
            while let Some(rec) = ovf.next()? {
                if rec.key == key {
                    return Ok(rec.value);
                }
            }
        }
        Err(LinHashError::ItemNotFound)
    }

    /// Checks uniqueness across the primary page and overflow chain, then
    /// inserts into the first free primary slot, falling back to the
    /// overflow chain when the primary page is full.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<InsertOutcome> {
        self.put(key, value, self.params.write_concern)
    }

    /// Behaves as `insert` under `WriteConcern::UpdateOrInsert`
    /// regardless of how the index was configured.
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<InsertOutcome> {
        self.put(key, value, WriteConcern::UpdateOrInsert)
    }

    fn put(&mut self, key: &[u8], value: &[u8], concern: WriteConcern) -> Result<InsertOutcome> {
        let bucket = self.bucket_for(key);
        self.cache.load(0, bucket, &mut self.main_file)?;

        let buffer = self.cache.buffer_mut(0)?;
        if let Some(i) = self.find_in_page(buffer, key) {
            match concern {
                WriteConcern::InsertUnique => return Err(LinHashError::Duplicate),
                WriteConcern::UpdateOrInsert => {
                    Self::slot_mut(buffer, self.layout, i).write(Status::InUse, key, value);
                    self.cache.flush(0, &mut self.main_file)?;
                    return Ok(InsertOutcome::Updated);
                }
            }
        }

        if self.overflow_exists(bucket) {
            let mut ovf = self.open_overflow(bucket)?;
            while let Some(rec) = ovf.next()? {
                if rec.key == key {
                    match concern {
                        WriteConcern::InsertUnique => return Err(LinHashError::Duplicate),
                        WriteConcern::UpdateOrInsert => {
                            ovf.remove()?;
                            if self.params.ordered_overflow {
                                let kind = self.params.key_kind;
                                ovf.insert_ordered(key, value, move |a, b| {
                                    crate::cursor::compare_keys(kind, a, b)
                                })?;
                            } else {
                                ovf.insert(key, value)?;
                            }
                            return Ok(InsertOutcome::Updated);
                        }
                    }
                }
            }
        }

        let buffer = self.cache.buffer_mut(0)?;
        if let Some(i) = self.find_free_in_page(buffer) {
            Self::slot_mut(buffer, self.layout, i).write(Status::InUse, key, value);
            self.cache.flush(0, &mut self.main_file)?;
            trace!("inserted key into primary page of bucket {bucket}");
            return Ok(InsertOutcome::InsertedInPrimary);
        }

        let mut ovf = self.open_overflow(bucket)?;
        if self.params.ordered_overflow {
            let kind = self.params.key_kind;
            ovf.insert_ordered(key, value, move |a, b| crate::cursor::compare_keys(kind, a, b))?;
        } else {
            ovf.insert(key, value)?;
        }
        trace!("inserted key into overflow chain of bucket {bucket}");
        Ok(InsertOutcome::InsertedInOverflow)
    }

    /// Tombstones every live slot matching `key`, across the primary page
    /// and the overflow chain, and returns how many were removed.
    /// `ItemNotFound` only when the total is zero.
    pub fn delete(&mut self, key: &[u8]) -> Result<usize> {
        let bucket = self.bucket_for(key);
        self.cache.load(0, bucket, &mut self.main_file)?;

        let mut removed = 0usize;
        let record_bytes = self.layout.record_bytes();
        let buffer = self.cache.buffer_mut(0)?;
        let matches: Vec<usize> = (0..self.params.records_per_bucket)
            .filter(|&i| {
                let slot = &buffer[i * record_bytes..(i + 1) * record_bytes];
                let rec = RecordRef::new(self.layout, slot);
                rec.is_in_use() && rec.key() == key
            })
            .collect();
        for i in &matches {
            Self::slot_mut(buffer, self.layout, *i).set_status(Status::Deleted);
        }
        removed += matches.len();
        if removed > 0 {
            self.cache.flush(0, &mut self.main_file)?;
        }

        if self.overflow_exists(bucket) {
            let mut ovf = self.open_overflow(bucket)?;
            while let Some(rec) = ovf.next()? {
                if rec.key == key {
                    ovf.remove()?;
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            trace!("deleted {removed} record(s) for key from bucket {bucket}");
            Ok(removed)
        } else {
            Err(LinHashError::ItemNotFound)
        }
    }

    /// Implements the recommended "split after any insert that touched
    /// the overflow file" policy. Callers that want a different trigger
    /// (e.g. a load-factor threshold) call `split` directly instead.
    pub fn maybe_split_after_insert(&mut self, outcome: InsertOutcome) -> Result<bool> {
        if outcome == InsertOutcome::InsertedInOverflow {
            self.split()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Splits the bucket currently at the split pointer: creates one new
    /// primary page, redistributes the old page's records and overflow
    /// chain between the two, then advances the split pointer (promoting
    /// the file level when it wraps).
    pub fn split(&mut self) -> Result<()> {
        let old_bucket = self.split_pointer;
        let new_bucket = self.bucket_count();

        self.cache.load(0, old_bucket, &mut self.main_file)?;
        self.cache.load_unbound(1)?;

        let record_bytes = self.layout.record_bytes();
        let records_per_bucket = self.params.records_per_bucket;
        let layout = self.layout;
        let key_kind = self.params.key_kind;
        let initial_buckets = self.params.initial_buckets;
        let level = self.level;
        let hash_fn = self.params.hash_fn.clone();

        {
            let old_buf = self.cache.buffer(0)?.to_vec();
            let mut moved: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
            let old_mut = self.cache.buffer_mut(0)?;
            for i in 0..records_per_bucket {
                let slot = &old_buf[i * record_bytes..(i + 1) * record_bytes];
                let rec = RecordRef::new(layout, slot);
                if !rec.is_in_use() {
                    continue;
                }
                let pair =
                    hash::compute(key_kind, rec.key(), initial_buckets, level, hash_fn.as_ref());
                if pair.low != pair.high {
                    moved.push((rec.key().to_vec(), rec.value().to_vec()));
                    Self::slot_mut(old_mut, layout, i).set_status(Status::Deleted);
                }
            }

            let new_buf = self.cache.buffer_mut(1)?;
            for (key, value) in &moved {
                let i = (0..records_per_bucket)
                    .find(|&i| {
                        let slot = &new_buf[i * record_bytes..(i + 1) * record_bytes];
                        RecordRef::new(layout, slot).status() != Status::InUse
                    })
                    .expect("freshly allocated page cannot be full");
                Self::slot_mut(new_buf, layout, i).write(Status::InUse, key, value);
            }
        }

        self.redistribute_overflow(old_bucket, new_bucket)?;

        // Neither page is likely to be touched again immediately after a
        // split, so release both buffers rather than leaving them pinned.
        self.cache.flush_mode(0, FlushMode::ReleaseMemory, &mut self.main_file)?;
        let flushed_new_bucket =
            self.cache.flush_mode(1, FlushMode::ReleaseMemory, &mut self.main_file)?;
        debug_assert_eq!(flushed_new_bucket, new_bucket);

        self.split_pointer += 1;
        if self.split_pointer == self.params.initial_buckets << self.level {
            self.split_pointer = 0;
            self.level += 1;
        }
        debug!(
            "split bucket {old_bucket} into {old_bucket}/{new_bucket}, level now {}, pointer now {}",
            self.level, self.split_pointer
        );
        Ok(())
    }

    /// Drains the old bucket's overflow chain (if any), placing each
    /// record wherever it now belongs: a free primary slot first, then a
    /// fresh overflow file for whichever of the two buckets it landed in.
    fn redistribute_overflow(&mut self, old_bucket: u64, new_bucket: u64) -> Result<()> {
        if !self.overflow_exists(old_bucket) {
            return Ok(());
        }

        let mut drained = Vec::new();
        {
            let mut ovf = self.open_overflow(old_bucket)?;
            while let Some(rec) = ovf.next()? {
                drained.push((rec.key, rec.value));
            }
        }
        std::fs::remove_file(
            self.params.directory.join(format!("{}_{}.ovf", self.params.id, old_bucket)),
        )?;
        if drained.is_empty() {
            return Ok(());
        }

        let record_bytes = self.layout.record_bytes();
        let records_per_bucket = self.params.records_per_bucket;
        let layout = self.layout;
        let key_kind = self.params.key_kind;
        let initial_buckets = self.params.initial_buckets;
        let level = self.level;
        let ordered = self.params.ordered_overflow;
        let hash_fn = self.params.hash_fn.clone();

        for (key, value) in drained {
            let pair = hash::compute(key_kind, &key, initial_buckets, level, hash_fn.as_ref());
            let (slot_index, target_bucket) =
                if pair.low != pair.high { (1usize, new_bucket) } else { (0usize, old_bucket) };

            let buffer = self.cache.buffer_mut(slot_index)?;
            let free = (0..records_per_bucket).find(|&i| {
                let s = &buffer[i * record_bytes..(i + 1) * record_bytes];
                RecordRef::new(layout, s).status() != Status::InUse
            });
            if let Some(i) = free {
                Self::slot_mut(buffer, layout, i).write(Status::InUse, &key, &value);
            } else {
                let mut ovf = self.open_overflow(target_bucket)?;
                if ordered {
                    ovf.insert_ordered(&key, &value, move |a, b| {
                        crate::cursor::compare_keys(key_kind, a, b)
                    })?;
                } else {
                    ovf.insert(&key, &value)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn params(dir: &Path) -> IndexParams {
        IndexParams {
            id: 1,
            key_kind: KeyKind::Unsigned,
            key_size: 4,
            value_size: 4,
            records_per_bucket: 2,
            initial_buckets: 4,
            write_concern: WriteConcern::InsertUnique,
            directory: dir.to_path_buf(),
            ordered_overflow: false,
            hash_fn: None,
        }
    }

    #[test]
    fn rejects_non_power_of_two_initial_size() {
        let dir = tempdir().unwrap();
        let mut p = params(dir.path());
        p.initial_buckets = 3;
        assert!(matches!(LinearHashIndex::create(p), Err(LinHashError::InvalidInitialSize(3))));
    }

    #[test]
    fn insert_then_query_round_trips() {
        let dir = tempdir().unwrap();
        let mut idx = LinearHashIndex::create(params(dir.path())).unwrap();
        idx.insert(&7u32.to_ne_bytes(), &99u32.to_ne_bytes()).unwrap();
        let value = idx.query(&7u32.to_ne_bytes()).unwrap();
        assert_eq!(value, 99u32.to_ne_bytes());
    }

    #[test]
    fn duplicate_insert_is_rejected_under_insert_unique() {
        let dir = tempdir().unwrap();
        let mut idx = LinearHashIndex::create(params(dir.path())).unwrap();
        idx.insert(&7u32.to_ne_bytes(), &1u32.to_ne_bytes()).unwrap();
        let err = idx.insert(&7u32.to_ne_bytes(), &2u32.to_ne_bytes()).unwrap_err();
        assert!(matches!(err, LinHashError::Duplicate));
    }

    #[test]
    fn update_overwrites_existing_value() {
        let dir = tempdir().unwrap();
        let mut idx = LinearHashIndex::create(params(dir.path())).unwrap();
        idx.insert(&7u32.to_ne_bytes(), &1u32.to_ne_bytes()).unwrap();
        idx.update(&7u32.to_ne_bytes(), &2u32.to_ne_bytes()).unwrap();
        assert_eq!(idx.query(&7u32.to_ne_bytes()).unwrap(), 2u32.to_ne_bytes());
    }

    #[test]
    fn delete_then_query_reports_not_found() {
        let dir = tempdir().unwrap();
        let mut idx = LinearHashIndex::create(params(dir.path())).unwrap();
        idx.insert(&7u32.to_ne_bytes(), &1u32.to_ne_bytes()).unwrap();
        assert_eq!(idx.delete(&7u32.to_ne_bytes()).unwrap(), 1);
        assert!(matches!(idx.query(&7u32.to_ne_bytes()), Err(LinHashError::ItemNotFound)));
        assert!(matches!(idx.delete(&7u32.to_ne_bytes()), Err(LinHashError::ItemNotFound)));
    }

    #[test]
    fn delete_sweeps_primary_page_and_overflow_chain() {
        let dir = tempdir().unwrap();
        // records_per_bucket=2, initial_buckets=4: 0, 4, 8 all hash to
        // bucket 0 at level 0, so the primary page holds 0 and 4 while 8
        // overflows. Deleting 4 must remove it from the primary page
        // without touching the overflow chain, and deleting 8 must sweep
        // the overflow chain rather than stopping after the primary scan.
        let mut idx = LinearHashIndex::create(params(dir.path())).unwrap();
        idx.insert(&0u32.to_ne_bytes(), &0u32.to_ne_bytes()).unwrap();
        idx.insert(&4u32.to_ne_bytes(), &40u32.to_ne_bytes()).unwrap();
        let outcome = idx.insert(&8u32.to_ne_bytes(), &80u32.to_ne_bytes()).unwrap();
        assert_eq!(outcome, InsertOutcome::InsertedInOverflow);

        assert_eq!(idx.delete(&4u32.to_ne_bytes()).unwrap(), 1);
        assert_eq!(idx.delete(&8u32.to_ne_bytes()).unwrap(), 1);
        assert!(matches!(idx.query(&4u32.to_ne_bytes()), Err(LinHashError::ItemNotFound)));
        assert!(matches!(idx.query(&8u32.to_ne_bytes()), Err(LinHashError::ItemNotFound)));
        assert_eq!(idx.query(&0u32.to_ne_bytes()).unwrap(), 0u32.to_ne_bytes());
    }

    #[test]
    fn overflow_insert_then_split_preserves_all_keys() {
        let dir = tempdir().unwrap();
        let mut idx = LinearHashIndex::create(params(dir.path())).unwrap();
        // records_per_bucket=2, initial_buckets=4: keys 0,4,8 all hash to bucket 0
        // at level 0 (k % 4), so the third insert overflows.
        idx.insert(&0u32.to_ne_bytes(), &0u32.to_ne_bytes()).unwrap();
        idx.insert(&4u32.to_ne_bytes(), &40u32.to_ne_bytes()).unwrap();
        let outcome = idx.insert(&8u32.to_ne_bytes(), &80u32.to_ne_bytes()).unwrap();
        assert_eq!(outcome, InsertOutcome::InsertedInOverflow);

        idx.split().unwrap();

        assert_eq!(idx.query(&0u32.to_ne_bytes()).unwrap(), 0u32.to_ne_bytes());
        assert_eq!(idx.query(&4u32.to_ne_bytes()).unwrap(), 40u32.to_ne_bytes());
        assert_eq!(idx.query(&8u32.to_ne_bytes()).unwrap(), 80u32.to_ne_bytes());
        assert_eq!(idx.bucket_count(), 5);
    }

    #[test]
    fn split_wraps_split_pointer_and_promotes_level() {
        let dir = tempdir().unwrap();
        let mut idx = LinearHashIndex::create(params(dir.path())).unwrap();
        for _ in 0..4 {
            idx.split().unwrap();
        }
        assert_eq!(idx.level, 1);
        assert_eq!(idx.split_pointer, 0);
        assert_eq!(idx.bucket_count(), 8);
    }

    #[test]
    fn destroy_removes_main_and_overflow_files() {
        let dir = tempdir().unwrap();
        let mut idx = LinearHashIndex::create(params(dir.path())).unwrap();
        idx.insert(&0u32.to_ne_bytes(), &0u32.to_ne_bytes()).unwrap();
        idx.insert(&4u32.to_ne_bytes(), &1u32.to_ne_bytes()).unwrap();
        idx.insert(&8u32.to_ne_bytes(), &2u32.to_ne_bytes()).unwrap();
        let main_path = dir.path().join("1_lh_main.bin");
        assert!(main_path.exists());
        idx.destroy().unwrap();
        assert!(!main_path.exists());
        assert!(!dir.path().join("1_0.ovf").exists());
    }

    #[test]
    fn custom_hash_fn_is_used_for_bucket_resolution() {
        let dir = tempdir().unwrap();
        let mut p = params(dir.path());
        // Every key resolves to bucket 0 regardless of its bytes.
        p.hash_fn = Some(std::sync::Arc::new(|_: &[u8]| 0u64));
        let mut idx = LinearHashIndex::create(p).unwrap();
        idx.insert(&1u32.to_ne_bytes(), &10u32.to_ne_bytes()).unwrap();
        idx.insert(&2u32.to_ne_bytes(), &20u32.to_ne_bytes()).unwrap();
        let outcome = idx.insert(&3u32.to_ne_bytes(), &30u32.to_ne_bytes()).unwrap();
        assert_eq!(outcome, InsertOutcome::InsertedInOverflow);
        assert_eq!(idx.query(&3u32.to_ne_bytes()).unwrap(), 30u32.to_ne_bytes());
    }

    #[test]
    fn updating_an_ordered_overflow_key_keeps_the_chain_sorted() {
        let dir = tempdir().unwrap();
        let mut p = params(dir.path());
        p.ordered_overflow = true;
        // Every key resolves to bucket 0, so with records_per_bucket=2
        // keys 5 and 10 both land in the overflow chain, in that sorted
        // order.
        p.hash_fn = Some(std::sync::Arc::new(|_: &[u8]| 0u64));
        let mut idx = LinearHashIndex::create(p).unwrap();
        idx.insert(&1u32.to_ne_bytes(), &10u32.to_ne_bytes()).unwrap();
        idx.insert(&2u32.to_ne_bytes(), &20u32.to_ne_bytes()).unwrap();
        idx.insert(&5u32.to_ne_bytes(), &50u32.to_ne_bytes()).unwrap();
        idx.insert(&10u32.to_ne_bytes(), &100u32.to_ne_bytes()).unwrap();

        // Re-inserting 5 must not move it past 10 in the chain: a naive
        // remove-then-append would leave the chain as [10, 5], breaking
        // the early-exit a range scan relies on.
        idx.update(&5u32.to_ne_bytes(), &500u32.to_ne_bytes()).unwrap();

        let mut cursor = idx
            .find(crate::cursor::Predicate::Range {
                low: Some(4u32.to_ne_bytes().to_vec()),
                high: Some(6u32.to_ne_bytes().to_vec()),
            })
            .unwrap();
        let mut found = Vec::new();
        while let Some((k, v)) = cursor.next().unwrap() {
            found.push((u32::from_ne_bytes(k.try_into().unwrap()), u32::from_ne_bytes(v.try_into().unwrap())));
        }
        assert_eq!(found, vec![(5, 500)]);
    }
}
