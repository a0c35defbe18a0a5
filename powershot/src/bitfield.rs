//! Named little-endian fields over fixed-size parameter blocks.
//!
//! A [`Field`] knows where it lives (offset, width) and optionally which
//! symbolic values it accepts. Fields are plain `const` data attached to a
//! [`ParameterBlock`] type and are always handed the buffer explicitly.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    /// Width in bytes, 1 to 8.
    pub width: usize,
    pub choices: &'static [(&'static str, u64)],
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, width: usize) -> Self {
        assert!(width >= 1 && width <= 8);
        Self {
            name,
            offset,
            width,
            choices: &[],
        }
    }

    pub const fn with_choices(mut self, choices: &'static [(&'static str, u64)]) -> Self {
        self.choices = choices;
        self
    }

    pub const fn end(&self) -> usize {
        self.offset + self.width
    }

    fn mask(&self) -> u64 {
        if self.width == 8 {
            u64::MAX
        } else {
            (1u64 << (self.width * 8)) - 1
        }
    }

    fn bytes<'a>(&self, buf: &'a [u8]) -> Result<&'a [u8]> {
        buf.get(self.offset..self.end()).ok_or(Error::Range {
            offset: self.offset,
            width: self.width,
            len: buf.len(),
        })
    }

    pub fn get(&self, buf: &[u8]) -> Result<u64> {
        let mut raw = [0u8; 8];
        raw[..self.width].copy_from_slice(self.bytes(buf)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// Store `value`, truncated to the field width.
    pub fn set(&self, buf: &mut [u8], value: u64) -> Result<()> {
        let len = buf.len();
        let dst = buf.get_mut(self.offset..self.end()).ok_or(Error::Range {
            offset: self.offset,
            width: self.width,
            len,
        })?;
        dst.copy_from_slice(&(value & self.mask()).to_le_bytes()[..self.width]);
        Ok(())
    }

    pub fn set_bits(&self, buf: &mut [u8], bits: u64) -> Result<()> {
        let current = self.get(buf)?;
        self.set(buf, current | bits)
    }

    pub fn clear_bits(&self, buf: &mut [u8], bits: u64) -> Result<()> {
        let current = self.get(buf)?;
        self.set(buf, current & !bits)
    }

    /// Value of the symbolic choice `name` (case-insensitive).
    pub fn choice(&self, name: &str) -> Option<u64> {
        self.choices
            .iter()
            .find(|(choice, _)| choice.eq_ignore_ascii_case(name))
            .map(|&(_, value)| value)
    }

    pub fn set_choice(&self, buf: &mut [u8], name: &str) -> Result<()> {
        let value = self.choice(name).ok_or_else(|| {
            Error::precondition(format!("field {} has no value named {}", self.name, name))
        })?;
        self.set(buf, value)
    }

    /// Name of the choice the field currently holds, if any.
    pub fn choice_name(&self, buf: &[u8]) -> Result<Option<&'static str>> {
        let value = self.get(buf)?;
        Ok(self
            .choices
            .iter()
            .find(|&&(_, v)| v == value)
            .map(|&(name, _)| name))
    }

    /// True when the field currently equals any of the named choices.
    /// Unknown names never match.
    pub fn is_any(&self, buf: &[u8], names: &[&str]) -> Result<bool> {
        let value = self.get(buf)?;
        Ok(names
            .iter()
            .filter_map(|name| self.choice(name))
            .any(|v| v == value))
    }
}

/// A fixed-size byte block described by a set of [`Field`]s.
pub trait ParameterBlock: Sized {
    const SIZE: usize;
    const FIELDS: &'static [Field];

    fn from_bytes_unchecked(bytes: &[u8]) -> Self;
    fn as_bytes(&self) -> &[u8];
    fn as_bytes_mut(&mut self) -> &mut [u8];

    fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(Error::SizeMismatch {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self::from_bytes_unchecked(bytes))
    }

    fn field(name: &str) -> Option<&'static Field> {
        Self::FIELDS.iter().find(|f| f.name == name)
    }

    fn get(&self, field: &Field) -> Result<u64> {
        field.get(self.as_bytes())
    }

    fn set(&mut self, field: &Field, value: u64) -> Result<()> {
        field.set(self.as_bytes_mut(), value)
    }
}
