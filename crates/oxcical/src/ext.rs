/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Little-endian push/pull cursors for the fixed binary layouts of the
//! appointment property set.

#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn get_u8(&mut self) -> Option<u8> {
        let value = *self.buf.get(self.offset)?;
        self.offset += 1;
        Some(value)
    }

    pub fn get_u16(&mut self) -> Option<u16> {
        let bytes = self.buf.get(self.offset..self.offset + 2)?;
        self.offset += 2;
        Some(u16::from_le_bytes(bytes.try_into().ok()?))
    }

    pub fn get_u32(&mut self) -> Option<u32> {
        let bytes = self.buf.get(self.offset..self.offset + 4)?;
        self.offset += 4;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    pub fn get_u64(&mut self) -> Option<u64> {
        let bytes = self.buf.get(self.offset..self.offset + 8)?;
        self.offset += 8;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    pub fn get_i32(&mut self) -> Option<i32> {
        self.get_u32().map(|v| v as i32)
    }

    pub fn get_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.buf.get(self.offset..self.offset + len)?;
        self.offset += len;
        Some(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut writer = Writer::new();
        writer.put_u8(7);
        writer.put_u16(0x3004);
        writer.put_u32(0xdead_beef);
        writer.put_i32(-300);
        let bytes = writer.finish();
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.get_u8(), Some(7));
        assert_eq!(reader.get_u16(), Some(0x3004));
        assert_eq!(reader.get_u32(), Some(0xdead_beef));
        assert_eq!(reader.get_i32(), Some(-300));
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.get_u8(), None);
    }
}
