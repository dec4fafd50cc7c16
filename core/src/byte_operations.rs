//! Little-endian readers and writers for fixed-width protocol fields.
//!
//! The wire format is not self-describing: a packet's fields live at fixed
//! offsets decided by its opcode. [`ByteReader`] walks such a payload and
//! returns `None` instead of panicking when a field would run past the end.

/// Cursor over a borrowed payload.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.offset.checked_add(N)?;
        let slice = self.bytes.get(self.offset..end)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.offset = end;
        Some(out)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }

    pub fn read_i8(&mut self) -> Option<i8> {
        self.take::<1>().map(|b| b[0] as i8)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        self.take::<2>().map(u16::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Option<i16> {
        self.take::<2>().map(i16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Option<u64> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    /// Read a `u16` length followed by that many UTF-8 bytes.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the cursor only moves
    /// when the whole string is present.
    pub fn read_string(&mut self) -> Option<String> {
        let start = self.offset;
        let len = self.read_u16()? as usize;
        let end = match self.offset.checked_add(len) {
            Some(end) if end <= self.bytes.len() => end,
            _ => {
                self.offset = start;
                return None;
            }
        };
        let text = String::from_utf8_lossy(&self.bytes[self.offset..end]).into_owned();
        self.offset = end;
        Some(text)
    }
}

/// Growable little-endian output buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_i16(&mut self, value: i16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Write a `u16` length prefix and the UTF-8 bytes of `text`.
    ///
    /// Text longer than `u16::MAX` bytes is truncated at a character
    /// boundary.
    pub fn put_string(&mut self, text: &str) -> &mut Self {
        let mut end = text.len().min(u16::MAX as usize);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        self.put_u16(end as u16);
        self.buf.extend_from_slice(&text.as_bytes()[..end]);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}
