//! Per-bucket overflow chain: a flat append-only file of record slots that
//! did not fit in a bucket's primary page.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{LinHashError, Result};
use crate::record::{Layout, RecordMut, RecordRef, Status};

/// An owned copy of one overflow record, detached from the file buffer.
#[derive(Debug, Clone)]
pub struct OwnedRecord {
    pub status: Status,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// The overflow file belonging to exactly one bucket.
pub struct OverflowFile {
    path: PathBuf,
    file: File,
    layout: Layout,
    /// Record index most recently handed back by `next`, so `remove` knows
    /// which slot to tombstone.
    last_yielded: Option<u64>,
    /// Scan position for `next`.
    cursor: u64,
}

fn overflow_path(dir: &Path, map_id: u64, bucket_id: u64) -> PathBuf {
    dir.join(format!("{map_id}_{bucket_id}.ovf"))
}

impl OverflowFile {
    /// Opens an existing overflow file, or creates it empty if absent.
    pub fn open_or_create(
        dir: &Path,
        map_id: u64,
        bucket_id: u64,
        layout: Layout,
    ) -> Result<OverflowFile> {
        let path = overflow_path(dir, map_id, bucket_id);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(OverflowFile { path, file, layout, last_yielded: None, cursor: 0 })
    }

    /// True if this bucket already has an overflow file on disk.
    pub fn exists(dir: &Path, map_id: u64, bucket_id: u64) -> bool {
        overflow_path(dir, map_id, bucket_id).exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_count(&self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        Ok(len / self.layout.record_bytes() as u64)
    }

    fn read_slot(&mut self, index: u64) -> Result<Vec<u8>> {
        let bytes = self.layout.record_bytes();
        let mut buf = vec![0u8; bytes];
        self.file.seek(SeekFrom::Start(index * bytes as u64))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_slot(&mut self, index: u64, buf: &[u8]) -> Result<()> {
        let bytes = self.layout.record_bytes();
        self.file.seek(SeekFrom::Start(index * bytes as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Rewinds the scan cursor to the start of the chain.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.last_yielded = None;
    }

    /// Returns the next live record in the chain, transparently skipping
    /// tombstones left by `remove`. `None` once the chain is exhausted.
    pub fn next(&mut self) -> Result<Option<OwnedRecord>> {
        let count = self.record_count()?;
        while self.cursor < count {
            let index = self.cursor;
            self.cursor += 1;
            let buf = self.read_slot(index)?;
            let rec = RecordRef::new(self.layout, &buf);
            if rec.status() == Status::InUse {
                self.last_yielded = Some(index);
                return Ok(Some(OwnedRecord {
                    status: Status::InUse,
                    key: rec.key().to_vec(),
                    value: rec.value().to_vec(),
                }));
            }
        }
        Ok(None)
    }

    /// Tombstones the record most recently returned by `next`.
    pub fn remove(&mut self) -> Result<()> {
        let index = self
            .last_yielded
            .ok_or_else(|| LinHashError::unable_to_insert("remove called with no prior next()"))?;
        let mut buf = self.read_slot(index)?;
        RecordMut::new(self.layout, &mut buf).set_status(Status::Deleted);
        self.write_slot(index, &buf)?;
        Ok(())
    }

    /// Appends a record at the end of the chain.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let buf = crate::record::encode(self.layout, Status::InUse, key, value);
        let count = self.record_count()?;
        self.write_slot(count, &buf)?;
        Ok(())
    }

    /// Rewrites the chain keeping only live records, sorted by `cmp`, with
    /// `key`/`value` inserted at its sorted position. Tombstones are
    /// dropped in the rewrite since the whole file is being rebuilt anyway.
    /// Used when the index was opened with ordered-overflow comparison so
    /// a future scan can stop as soon as `cmp` reports the target has been
    /// passed.
    pub fn insert_ordered<F>(&mut self, key: &[u8], value: &[u8], mut cmp: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> std::cmp::Ordering,
    {
        self.reset();
        let mut live = Vec::new();
        while let Some(rec) = self.next()? {
            live.push(rec);
        }
        let pos = live.partition_point(|rec| cmp(&rec.key, key) == std::cmp::Ordering::Less);
        live.insert(
            pos,
            OwnedRecord { status: Status::InUse, key: key.to_vec(), value: value.to_vec() },
        );
        self.file.set_len(0)?;
        for (i, rec) in live.iter().enumerate() {
            let buf = crate::record::encode(self.layout, Status::InUse, &rec.key, &rec.value);
            self.write_slot(i as u64, &buf)?;
        }
        self.reset();
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        Ok(())
    }
}
