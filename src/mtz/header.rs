//! The 80-byte file prologue.
//!
//! ```text
//! word 1    "MTZ "
//! word 2    header pointer: 1-based word index of the first header record
//! word 3    machine stamp: byte 0 = 0x44 (little-endian IEEE) or 0x11 (big-endian)
//! 4..20     zero
//! 21..      reflection table, row-major nref × ncol f32
//! ```

use std::io::Write;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};

use super::MtzError;

pub const MAGIC: &[u8; 4] = b"MTZ ";
/// Byte offset of the reflection table.
pub const PROLOGUE_LEN: usize = 80;

const STAMP_LITTLE: [u8; 4] = [0x44, 0x41, 0x00, 0x00];
const STAMP_BIG:    [u8; 4] = [0x11, 0x11, 0x00, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    fn stamp(self) -> [u8; 4] {
        match self {
            Endian::Little => STAMP_LITTLE,
            Endian::Big    => STAMP_BIG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prologue {
    pub endian:        Endian,
    /// Byte offset of the first header record.
    pub header_offset: u64,
}

impl Prologue {
    /// Prologue for a file whose header starts at `header_offset` bytes.
    pub fn new(endian: Endian, header_offset: u64) -> Result<Self, MtzError> {
        if header_offset % 4 != 0 || header_offset < PROLOGUE_LEN as u64 {
            return Err(MtzError::Malformed {
                keyword: "MTZ",
                reason:  format!("header offset {header_offset} is not a word boundary past the prologue"),
            });
        }
        Ok(Self { endian, header_offset })
    }

    fn pointer(&self) -> Result<i32, MtzError> {
        i32::try_from(self.header_offset / 4 + 1).map_err(|_| MtzError::TooLarge(self.header_offset))
    }

    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), MtzError> {
        let pointer = self.pointer()?;
        writer.write_all(MAGIC)?;
        match self.endian {
            Endian::Little => writer.write_i32::<LittleEndian>(pointer)?,
            Endian::Big    => writer.write_i32::<BigEndian>(pointer)?,
        }
        writer.write_all(&self.endian.stamp())?;
        writer.write_all(&[0u8; PROLOGUE_LEN - 12])?;
        Ok(())
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, MtzError> {
        if bytes.len() < PROLOGUE_LEN {
            return Err(MtzError::Truncated("prologue"));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        if &magic != MAGIC {
            return Err(MtzError::BadMagic(magic));
        }
        let endian = match bytes[8] >> 4 {
            0x4 => Endian::Little,
            0x1 => Endian::Big,
            _   => return Err(MtzError::UnsupportedStamp(bytes[8])),
        };
        let pointer = match endian {
            Endian::Little => LittleEndian::read_i32(&bytes[4..8]),
            Endian::Big    => BigEndian::read_i32(&bytes[4..8]),
        };
        let words = u64::try_from(pointer)
            .ok()
            .filter(|&w| w >= 1)
            .ok_or_else(|| MtzError::Malformed {
                keyword: "MTZ",
                reason:  format!("header pointer {pointer}"),
            })?;
        Self::new(endian, (words - 1) * 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prologue_roundtrip_both_orders() {
        for endian in [Endian::Little, Endian::Big] {
            let p = Prologue::new(endian, 80 + 4 * 12).unwrap();
            let mut buf = Vec::new();
            p.write(&mut buf).unwrap();
            assert_eq!(buf.len(), PROLOGUE_LEN);
            assert_eq!(Prologue::parse(&buf).unwrap(), p);
        }
    }

    #[test]
    fn pointer_is_one_based_words() {
        let mut buf = Vec::new();
        Prologue::new(Endian::Little, 80).unwrap().write(&mut buf).unwrap();
        assert_eq!(&buf[..4], b"MTZ ");
        assert_eq!(LittleEndian::read_i32(&buf[4..8]), 21);
        assert_eq!(&buf[8..10], &[0x44, 0x41]);
    }

    #[test]
    fn rejects_bad_magic_and_stamp() {
        let mut buf = vec![0u8; PROLOGUE_LEN];
        buf[..4].copy_from_slice(b"MTX ");
        assert!(matches!(Prologue::parse(&buf), Err(MtzError::BadMagic(_))));
        buf[..4].copy_from_slice(MAGIC);
        buf[8] = 0x22;
        assert!(matches!(Prologue::parse(&buf), Err(MtzError::UnsupportedStamp(0x22))));
        assert!(matches!(Prologue::parse(&buf[..10]), Err(MtzError::Truncated(_))));
    }
}
