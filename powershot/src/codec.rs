//! Little-endian integer access, C string extraction and hexdumps.
//!
//! Every accessor checks its bounds and reports `Error::Range` instead of
//! panicking or silently truncating.

use itertools::Itertools;
use memchr::memchr;

use crate::error::{Error, Result};

fn slice(bytes: &[u8], offset: usize, width: usize) -> Result<&[u8]> {
    offset
        .checked_add(width)
        .and_then(|end| bytes.get(offset..end))
        .ok_or(Error::Range {
            offset,
            width,
            len: bytes.len(),
        })
}

pub fn le16(bytes: &[u8], offset: usize) -> Result<u16> {
    let raw = slice(bytes, offset, 2)?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

pub fn le32(bytes: &[u8], offset: usize) -> Result<u32> {
    let raw = slice(bytes, offset, 4)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

pub fn to_le32_bytes(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Store `value` as LE32 at `offset`.
pub fn put_le32(bytes: &mut [u8], offset: usize, value: u32) -> Result<()> {
    let len = bytes.len();
    let dst = offset
        .checked_add(4)
        .and_then(|end| bytes.get_mut(offset..end))
        .ok_or(Error::Range {
            offset,
            width: 4,
            len,
        })?;
    dst.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Read the NUL-terminated string starting at `offset`.
///
/// Returns `Ok(None)` when no terminator is found before the end of the
/// buffer. An offset past the end is a range error; an offset exactly at
/// the end simply has no terminator.
pub fn extract_cstring(bytes: &[u8], offset: usize) -> Result<Option<String>> {
    let tail = bytes.get(offset..).ok_or(Error::Range {
        offset,
        width: 1,
        len: bytes.len(),
    })?;
    Ok(memchr(0x00, tail).map(|end| String::from_utf8_lossy(&tail[..end]).into_owned()))
}

fn printable(byte: u8) -> char {
    match byte {
        0x00 => '.',
        b if b.is_ascii_graphic() || b == b' ' => b as char,
        _ => ';',
    }
}

/// Classic 16-bytes-per-row dump used for transfer logging.
///
/// ```text
/// 0000  10 00 00 00 01 02 00 00  00 00 00 00 00 00 00 00   ........ ........
/// ```
pub fn hexdump(bytes: &[u8]) -> String {
    bytes
        .chunks(0x10)
        .enumerate()
        .map(|(row, chunk)| {
            let hex = chunk
                .chunks(8)
                .map(|half| half.iter().map(|b| format!("{:02x}", b)).join(" "))
                .join("  ");
            let ascii = chunk
                .chunks(8)
                .map(|half| half.iter().copied().map(printable).collect::<String>())
                .join(" ");
            format!("{:04x}  {:<51}{}", row * 0x10, hex, ascii)
        })
        .join("\n")
}
