//! Explicit-slot primary-page cache. Unlike an associative cache, the
//! caller names the slot it wants (slot 0 = the bucket being split, slot 1
//! = the new bucket being created), so two primary pages can be held live
//! at once during a split without any eviction policy.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::Result;

/// Sentinel bucket id meaning "this slot holds a page that has not been
/// assigned a location yet" — flushing it appends a new page at EOF and
/// the returned bucket id becomes its home.
pub const UNBOUND: u64 = u64::MAX;

/// What `flush_mode` should do with a slot's buffer once the write
/// completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Leave the buffer allocated (`Flushed`) for a cheap re-read.
    KeepMemory,
    /// Free the buffer (`Invalid`); the next `load` reallocates it.
    ReleaseMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// No buffer has been allocated for this slot yet.
    Invalid,
    /// A buffer exists but its contents do not reflect any bucket.
    Flushed,
    /// The buffer holds the live contents of `bucket_id`.
    Active,
}

struct Slot {
    state: SlotState,
    bucket_id: u64,
    buffer: Vec<u8>,
}

pub struct PageCache {
    slots: Vec<Slot>,
    bucket_bytes: usize,
}

impl PageCache {
    pub fn new(num_slots: usize, bucket_bytes: usize) -> PageCache {
        assert!(num_slots >= 2, "page cache needs at least 2 explicit slots for splits");
        let slots = (0..num_slots)
            .map(|_| Slot { state: SlotState::Invalid, bucket_id: UNBOUND, buffer: Vec::new() })
            .collect();
        PageCache { slots, bucket_bytes }
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, slot: usize) -> Result<&Slot> {
        self.slots
            .get(slot)
            .ok_or_else(|| crate::error::LinHashError::InvalidCacheSlot(slot))
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut Slot> {
        let len = self.slots.len();
        self.slots
            .get_mut(slot)
            .ok_or(crate::error::LinHashError::InvalidCacheSlot(slot.min(len)))
    }

    /// Loads the primary page for `bucket_id` from disk into `slot`. A
    /// slot already `Active` for this same bucket is a no-op; `Active` for
    /// a different bucket is flushed first so no pending write is lost;
    /// `Flushed` reads into the existing buffer; `Invalid` allocates one.
    pub fn load(&mut self, slot: usize, bucket_id: u64, file: &mut File) -> Result<()> {
        if self.slot(slot)?.state == SlotState::Active && self.slot(slot)?.bucket_id == bucket_id {
            return Ok(());
        }
        if self.slot(slot)?.state == SlotState::Active {
            self.flush(slot, file)?;
        }
        let bucket_bytes = self.bucket_bytes;
        let s = self.slot_mut(slot)?;
        if s.buffer.len() != bucket_bytes {
            s.buffer = vec![0u8; bucket_bytes];
        }
        file.seek(SeekFrom::Start(bucket_id * bucket_bytes as u64))?;
        file.read_exact(&mut s.buffer)?;
        s.bucket_id = bucket_id;
        s.state = SlotState::Active;
        Ok(())
    }

    /// Prepares `slot` to hold a brand-new, all-empty page not yet
    /// assigned a bucket id on disk.
    pub fn load_unbound(&mut self, slot: usize) -> Result<()> {
        let bucket_bytes = self.bucket_bytes;
        let s = self.slot_mut(slot)?;
        s.buffer = vec![0u8; bucket_bytes];
        s.bucket_id = UNBOUND;
        s.state = SlotState::Active;
        Ok(())
    }

    /// Unconditionally writes `slot`'s buffer back to disk (no dirty-bit
    /// tracking: every flush writes, even if the buffer was never
    /// mutated). Returns the bucket id the page now lives at; for a
    /// previously-`UNBOUND` slot this is the freshly appended page's id.
    /// Equivalent to `flush_mode(slot, FlushMode::KeepMemory, file)`.
    pub fn flush(&mut self, slot: usize, file: &mut File) -> Result<u64> {
        self.flush_mode(slot, FlushMode::KeepMemory, file)
    }

    /// As `flush`, but `mode` additionally controls what happens to the
    /// slot's buffer afterward: `KeepMemory` leaves it allocated
    /// (`Flushed`, ready for a cheap re-read), `ReleaseMemory` frees it
    /// (`Invalid`) for callers that know the slot won't be touched again
    /// soon, e.g. the losing side of a split.
    pub fn flush_mode(&mut self, slot: usize, mode: FlushMode, file: &mut File) -> Result<u64> {
        let bucket_bytes = self.bucket_bytes as u64;
        let s = self.slot_mut(slot)?;
        let bucket_id = if s.bucket_id == UNBOUND {
            let len = file.metadata()?.len();
            len / bucket_bytes
        } else {
            s.bucket_id
        };
        file.seek(SeekFrom::Start(bucket_id * bucket_bytes))?;
        file.write_all(&s.buffer)?;
        s.bucket_id = bucket_id;
        match mode {
            FlushMode::KeepMemory => s.state = SlotState::Flushed,
            FlushMode::ReleaseMemory => {
                s.state = SlotState::Invalid;
                s.buffer.clear();
            }
        }
        Ok(bucket_id)
    }

    pub fn buffer(&self, slot: usize) -> Result<&[u8]> {
        Ok(&self.slot(slot)?.buffer)
    }

    pub fn buffer_mut(&mut self, slot: usize) -> Result<&mut [u8]> {
        Ok(&mut self.slot_mut(slot)?.buffer)
    }

    pub fn bucket_id(&self, slot: usize) -> Result<u64> {
        Ok(self.slot(slot)?.bucket_id)
    }
}
