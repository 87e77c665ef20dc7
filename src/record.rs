//! Fixed-width record slot codec: `[status_byte | key_bytes | value_bytes]`.

/// Status of a single record slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Slot has never been written.
    Empty,
    /// Slot holds a live record.
    InUse,
    /// Slot held a record that has since been removed; scans must not
    /// stop here, they skip past it.
    Deleted,
}

impl Status {
    fn from_byte(b: u8) -> Status {
        match b {
            0 => Status::Empty,
            1 => Status::InUse,
            2 => Status::Deleted,
            other => panic!("corrupt record status byte: {other}"),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Status::Empty => 0,
            Status::InUse => 1,
            Status::Deleted => 2,
        }
    }
}

/// Layout parameters shared by every slot belonging to one index.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub key_size: usize,
    pub value_size: usize,
}

impl Layout {
    pub fn new(key_size: usize, value_size: usize) -> Layout {
        Layout { key_size, value_size }
    }

    /// Total bytes occupied by one slot, status byte included.
    pub fn record_bytes(&self) -> usize {
        1 + self.key_size + self.value_size
    }
}

/// A read-only view into one record slot inside a larger buffer.
pub struct RecordRef<'a> {
    layout: Layout,
    bytes: &'a [u8],
}

impl<'a> RecordRef<'a> {
    pub fn new(layout: Layout, bytes: &'a [u8]) -> RecordRef<'a> {
        assert_eq!(bytes.len(), layout.record_bytes());
        RecordRef { layout, bytes }
    }

    pub fn status(&self) -> Status {
        Status::from_byte(self.bytes[0])
    }

    pub fn key(&self) -> &'a [u8] {
        &self.bytes[1..1 + self.layout.key_size]
    }

    pub fn value(&self) -> &'a [u8] {
        &self.bytes[1 + self.layout.key_size..]
    }

    pub fn is_in_use(&self) -> bool {
        self.status() == Status::InUse
    }
}

/// A mutable view into one record slot inside a larger buffer.
pub struct RecordMut<'a> {
    layout: Layout,
    bytes: &'a mut [u8],
}

impl<'a> RecordMut<'a> {
    pub fn new(layout: Layout, bytes: &'a mut [u8]) -> RecordMut<'a> {
        assert_eq!(bytes.len(), layout.record_bytes());
        RecordMut { layout, bytes }
    }

    pub fn status(&self) -> Status {
        Status::from_byte(self.bytes[0])
    }

    pub fn key(&self) -> &[u8] {
        &self.bytes[1..1 + self.layout.key_size]
    }

    pub fn value(&self) -> &[u8] {
        &self.bytes[1 + self.layout.key_size..]
    }

    pub fn set_status(&mut self, status: Status) {
        self.bytes[0] = status.to_byte();
    }

    pub fn write(&mut self, status: Status, key: &[u8], value: &[u8]) {
        assert_eq!(key.len(), self.layout.key_size);
        assert_eq!(value.len(), self.layout.value_size);
        self.bytes[0] = status.to_byte();
        let key_end = 1 + self.layout.key_size;
        self.bytes[1..key_end].copy_from_slice(key);
        self.bytes[key_end..].copy_from_slice(value);
    }

    pub fn clear(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

/// Encode an owned record into a freshly allocated slot-sized buffer.
pub fn encode(layout: Layout, status: Status, key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; layout.record_bytes()];
    RecordMut::new(layout, &mut buf).write(status, key, value);
    buf
}
