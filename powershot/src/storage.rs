//! The camera's flash card, as a tiny DOS-like file system.

use std::io::Write;

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};
use log::{debug, info};
use memchr::memchr;

use crate::catalog::{FLASH_DEVICE_IDENT, GET_DIR, GET_FILE};
use crate::codec::{extract_cstring, le32};
use crate::error::{Error, Result};
use crate::usb::packet::MAX_CHUNK_SIZE;
use crate::usb::transport::Transport;
use crate::usb::UsbIo;

/// Listing depth large enough to cover every file on the card.
pub const FULL_DEPTH: u8 = 12;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FsAttributes: u8 {
        const WRITE_PROTECTED = 0x01;
        const RECURSE_DIR     = 0x10;
        const NOT_DOWNLOADED  = 0x20;
        const DIRECTORY       = 0x80;
    }
}

/// Index of an entry inside its [`DirTree`].
pub type EntryId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub name: String,
    pub size: u32,
    pub timestamp: u32,
    pub attributes: FsAttributes,
    parent: Option<EntryId>,
    children: Vec<EntryId>,
}

impl FsEntry {
    pub fn is_dir(&self) -> bool {
        self.attributes.contains(FsAttributes::DIRECTORY)
    }

    pub fn parent(&self) -> Option<EntryId> {
        self.parent
    }

    pub fn children(&self) -> &[EntryId] {
        &self.children
    }
}

/// A directory listing. Entry 0 is the listed directory itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirTree {
    base: String,
    entries: Vec<FsEntry>,
}

// [attr:1][?:1][size:4][timestamp:4][name\0]
const ENTRY_HEADER_LEN: usize = 10;

impl DirTree {
    /// Build the tree from a raw `GET_DIR` listing of `base`.
    ///
    /// The first record is the listed directory. A record flagged as a
    /// directory, or named with a `.\` prefix, opens a level that the
    /// records after it fill until a `..` record closes it. An empty name
    /// ends the listing.
    pub fn parse(base: impl Into<String>, listing: &[u8]) -> Result<Self> {
        let mut tree = DirTree {
            base: base.into(),
            entries: Vec::new(),
        };
        let mut current: EntryId = 0;
        let mut offset = 0;

        while let Some(name_bytes) = listing
            .get(offset + ENTRY_HEADER_LEN..)
            .and_then(|tail| memchr(0x00, tail).map(|end| &tail[..end]))
        {
            if name_bytes.is_empty() {
                break;
            }
            let name = String::from_utf8_lossy(name_bytes).into_owned();
            let attributes = FsAttributes::from_bits_retain(listing[offset]);
            let size = le32(listing, offset + 2)?;
            let timestamp = le32(listing, offset + 6)?;
            offset += ENTRY_HEADER_LEN + name_bytes.len() + 1;

            if tree.entries.is_empty() {
                tree.entries.push(FsEntry {
                    name,
                    size,
                    timestamp,
                    attributes,
                    parent: None,
                    children: Vec::new(),
                });
                continue;
            }

            if name == ".." {
                match tree.entries[current].parent {
                    Some(parent) => current = parent,
                    None => debug!("listing climbs above its root, ignoring"),
                }
                continue;
            }

            let (name, opens) = match name.strip_prefix(".\\") {
                Some(stripped) => (stripped.to_string(), true),
                None => (name, attributes.contains(FsAttributes::DIRECTORY)),
            };
            let id = tree.entries.len();
            tree.entries.push(FsEntry {
                name,
                size,
                timestamp,
                attributes,
                parent: Some(current),
                children: Vec::new(),
            });
            tree.entries[current].children.push(id);
            if opens {
                current = id;
            }
        }

        if tree.entries.is_empty() {
            return Err(Error::protocol("directory listing holds no entries"));
        }
        Ok(tree)
    }

    pub fn root(&self) -> &FsEntry {
        &self.entries[0]
    }

    pub fn get(&self, id: EntryId) -> Option<&FsEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn children(&self, id: EntryId) -> impl Iterator<Item = &FsEntry> + '_ {
        self.entries
            .get(id)
            .into_iter()
            .flat_map(move |entry| entry.children.iter().map(move |&child| &self.entries[child]))
    }

    /// Entry ids in depth-first order, parents before their children.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: vec![0],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FsEntry> + '_ {
        self.walk().map(move |id| &self.entries[id])
    }

    /// Camera path of entry `id`, usable with [`Storage::download`].
    pub fn path(&self, id: EntryId) -> Option<String> {
        let mut names = Vec::new();
        let mut cursor = self.entries.get(id)?;
        while let Some(parent) = cursor.parent {
            names.push(cursor.name.as_str());
            cursor = &self.entries[parent];
        }
        names.push(self.base.as_str());
        names.reverse();
        Some(names.join("\\"))
    }

    /// Find an entry by its path relative to the root, `\` or `/` separated.
    pub fn find(&self, relative: &str) -> Option<EntryId> {
        relative
            .split(['\\', '/'])
            .filter(|part| !part.is_empty())
            .try_fold(0, |id, part| {
                self.entries[id]
                    .children
                    .iter()
                    .copied()
                    .find(|&child| self.entries[child].name.eq_ignore_ascii_case(part))
            })
    }
}

pub struct Walk<'a> {
    tree: &'a DirTree,
    stack: Vec<EntryId>,
}

impl Iterator for Walk<'_> {
    type Item = EntryId;

    fn next(&mut self) -> Option<EntryId> {
        let id = self.stack.pop()?;
        let entry = self.tree.entries.get(id)?;
        self.stack.extend(entry.children.iter().rev());
        Some(id)
    }
}

/// Turn `path` into an absolute camera path on `drive`.
pub fn normalize_path(drive: &str, path: &str) -> String {
    let path = path.replace('/', "\\");
    if path.starts_with(drive) {
        return path;
    }
    let joined = format!("{}\\{}", drive, path.trim_start_matches('\\'));
    joined.trim_end_matches('\\').to_string()
}

/// File system commands, borrowed from a [`Camera`](crate::Camera).
pub struct Storage<'a, D: UsbIo> {
    transport: &'a mut Transport<D>,
}

impl<'a, D: UsbIo> Storage<'a, D> {
    pub fn new(transport: &'a mut Transport<D>) -> Self {
        Self { transport }
    }

    /// Name of the card's root, e.g. `A:`.
    pub fn drive(&mut self) -> Result<String> {
        let response = self.transport.command(&FLASH_DEVICE_IDENT, &[])?;
        extract_cstring(&response.data, 0)?.ok_or_else(|| Error::protocol("unterminated drive name"))
    }

    fn absolute(&mut self, path: &str) -> Result<String> {
        let drive = self.drive()?;
        Ok(normalize_path(&drive, path))
    }

    /// List `path` (the card root when empty), `depth` levels deep.
    pub fn list(&mut self, path: &str, depth: u8) -> Result<DirTree> {
        let path = self.absolute(path)?;
        let mut payload = BytesMut::with_capacity(path.len() + 4);
        payload.put_u8(depth);
        payload.put_slice(path.as_bytes());
        payload.put_bytes(0, 3);

        let response = self.transport.command(&GET_DIR, &payload)?;
        let tree = DirTree::parse(path, &response.data)?;
        info!("listed {} entries under {}", tree.len(), tree.base);
        Ok(tree)
    }

    /// Stream a file, or its thumbnail, into `sink`. Returns the byte count.
    pub fn download<W: Write>(&mut self, path: &str, sink: &mut W, thumbnail: bool) -> Result<u64> {
        let path = self.absolute(path)?;
        let mut payload = BytesMut::with_capacity(path.len() + 9);
        payload.put_u32_le(u32::from(thumbnail));
        payload.put_u32_le(MAX_CHUNK_SIZE as u32);
        payload.put_slice(path.as_bytes());
        payload.put_u8(0);

        let written = self.transport.command_into(&GET_FILE, &payload, sink, false)?;
        info!("downloaded 0x{:x} bytes of {}", written, path);
        Ok(written)
    }
}
