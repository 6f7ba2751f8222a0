//! A seekable, bounds-checked view over an immutable byte slice.
//!
//! Generalizes the `Position<T>`/`ReadFromBytes` pair from the teacher's
//! `fonts2::parsing` module (itself a safe successor to the `unsafe Pod` casts
//! in `fonts::ttf_types`) into a single cursor type shared by the SFNT, CFF,
//! and CMap parsers. Every read is bounds-checked; nothing here ever indexes
//! past the end of the buffer.

use crate::error::Error;

#[derive(Debug, Copy, Clone)]
pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

macro_rules! be_reader {
    ($name:ident, $ty:ty, $width:expr) => {
        pub fn $name(&mut self) -> Result<$ty, Error> {
            let bytes = self.bytes($width)?;
            let mut array = [0u8; $width];
            array.copy_from_slice(bytes);
            Ok(<$ty>::from_be_bytes(array))
        }
    };
}

macro_rules! le_reader {
    ($name:ident, $ty:ty, $width:expr) => {
        pub fn $name(&mut self) -> Result<$ty, Error> {
            let bytes = self.bytes($width)?;
            let mut array = [0u8; $width];
            array.copy_from_slice(bytes);
            Ok(<$ty>::from_le_bytes(array))
        }
    };
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Cursor { buffer, offset: 0 }
    }

    pub fn at(buffer: &'a [u8], offset: usize) -> Result<Self, Error> {
        let mut cursor = Cursor::new(buffer);
        cursor.seek(offset)?;
        Ok(cursor)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// The whole backing slice, independent of the cursor's current
    /// position. Used by parsers that need to re-slice a span they've
    /// already scanned over (e.g. to turn `start..end` positions into a
    /// borrowed token after validating its characters one at a time).
    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    pub fn seek(&mut self, offset: usize) -> Result<(), Error> {
        if offset > self.buffer.len() {
            return Err(Error::Eof);
        }
        self.offset = offset;
        Ok(())
    }

    pub fn advance(&mut self, by: usize) -> Result<(), Error> {
        self.seek(self.offset.checked_add(by).ok_or(Error::Eof)?)
    }

    /// Returns the next `n` bytes without consuming them.
    pub fn peek_bytes(&self, n: usize) -> Result<&'a [u8], Error> {
        self.buffer
            .get(self.offset..)
            .ok_or(Error::Eof)?
            .get(..n)
            .ok_or(Error::Eof)
    }

    /// Consumes and returns the next `n` bytes.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let slice = self.peek_bytes(n)?;
        self.offset += n;
        Ok(slice)
    }

    pub fn peek_u8(&self) -> Result<u8, Error> {
        self.peek_bytes(1).map(|b| b[0])
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        self.bytes(1).map(|b| b[0])
    }

    pub fn i8(&mut self) -> Result<i8, Error> {
        self.u8().map(|b| b as i8)
    }

    be_reader!(u16_be, u16, 2);
    be_reader!(i16_be, i16, 2);
    be_reader!(u32_be, u32, 4);
    be_reader!(i32_be, i32, 4);
    be_reader!(f64_be, f64, 8);

    le_reader!(u16_le, u16, 2);
    le_reader!(u32_le, u32, 4);

    /// A nested cursor over the next `len` bytes; advances `self` past them.
    pub fn subcursor(&mut self, len: usize) -> Result<Cursor<'a>, Error> {
        Ok(Cursor::new(self.bytes(len)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_integers() {
        let data = [0x00, 0x01, 0xFF, 0xFF, 0xFF, 0xFE];
        let mut c = Cursor::new(&data);
        assert_eq!(c.u16_be().unwrap(), 1);
        assert_eq!(c.i16_be().unwrap(), -2);
    }

    #[test]
    fn seek_past_end_is_eof() {
        let data = [1, 2, 3];
        let mut c = Cursor::new(&data);
        assert!(c.seek(4).is_err());
        assert!(c.seek(3).is_ok());
        assert!(c.u8().is_err());
    }

    #[test]
    fn bounds_checked_before_read() {
        let data = [1, 2];
        let mut c = Cursor::new(&data);
        assert!(c.u32_be().is_err());
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn subcursor_advances_parent() {
        let data = [1, 2, 3, 4, 5];
        let mut c = Cursor::new(&data);
        let mut sub = c.subcursor(2).unwrap();
        assert_eq!(sub.u8().unwrap(), 1);
        assert_eq!(c.position(), 2);
    }
}
