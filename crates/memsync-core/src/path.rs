//! Hierarchical view of the key space
//!
//! Keys stay opaque bytes; `/` splits them into a folder and a name for
//! listing and for scoped syncs. `users/alice/cart` lives in folder
//! `users/alice`, which is contained in `users` and in the root folder.

use crate::error::{Error, Result};
use crate::value::Key;
use bytes::Bytes;
use std::fmt;

/// Separator between path segments
pub const SEPARATOR: u8 = b'/';

/// How far below a folder a listing reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Keys directly in the folder
    Simple,
    /// Keys in the folder and every folder below it
    Recursive,
}

/// A folder of the key hierarchy; the root has no segments
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderPath {
    parts: Vec<Bytes>,
}

impl FolderPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse `a/b` (or `a/b/`); an empty string or `/` is the root
    pub fn parse(raw: impl AsRef<[u8]>) -> Result<Self> {
        let raw = raw.as_ref();
        let raw = raw.strip_suffix(&[SEPARATOR]).unwrap_or(raw);
        if raw.is_empty() {
            return Ok(Self::root());
        }

        let mut parts = Vec::new();
        for part in raw.split(|b| *b == SEPARATOR) {
            if part.is_empty() {
                return Err(Error::InvalidKey(format!(
                    "Empty segment in folder path {:?}",
                    String::from_utf8_lossy(raw)
                )));
            }
            parts.push(Bytes::copy_from_slice(part));
        }
        Ok(Self { parts })
    }

    /// Folder holding a key: everything before its last separator
    pub fn of_key(key: &[u8]) -> Self {
        match key.iter().rposition(|b| *b == SEPARATOR) {
            Some(split) => Self {
                parts: key[..split]
                    .split(|b| *b == SEPARATOR)
                    .map(Bytes::copy_from_slice)
                    .collect(),
            },
            None => Self::root(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    /// True if `other` is this folder or lies below it
    pub fn contains(&self, other: &FolderPath) -> bool {
        other.parts.starts_with(&self.parts)
    }

    /// True if `key` is reachable from this folder at `depth`
    pub fn holds(&self, key: &[u8], depth: Depth) -> bool {
        let folder = Self::of_key(key);
        match depth {
            Depth::Simple => folder == *self,
            Depth::Recursive => self.contains(&folder),
        }
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            write!(f, "{}/", String::from_utf8_lossy(part))?;
        }
        if self.is_root() {
            write!(f, "/")?;
        }
        Ok(())
    }
}

/// Target of a scoped sync: one key or a whole folder subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPath {
    Folder(FolderPath),
    Key(Key),
}

impl KeyPath {
    /// A trailing `/` (or an empty path) names a folder, anything else a key
    pub fn parse(raw: impl AsRef<[u8]>) -> Result<Self> {
        let raw = raw.as_ref();
        if raw.is_empty() || raw.ends_with(&[SEPARATOR]) {
            FolderPath::parse(raw).map(KeyPath::Folder)
        } else {
            Key::new(Bytes::copy_from_slice(raw)).map(KeyPath::Key)
        }
    }

    pub fn covers(&self, key: &[u8]) -> bool {
        match self {
            KeyPath::Folder(folder) => folder.holds(key, Depth::Recursive),
            KeyPath::Key(only) => only.as_bytes() == key,
        }
    }

    /// Wire form, accepted back by [`KeyPath::parse`]
    pub fn to_bytes(&self) -> Bytes {
        match self {
            KeyPath::Folder(folder) if folder.is_root() => Bytes::new(),
            KeyPath::Folder(folder) => Bytes::from(folder.to_string()),
            KeyPath::Key(key) => key.to_bytes(),
        }
    }
}

impl From<FolderPath> for KeyPath {
    fn from(folder: FolderPath) -> Self {
        KeyPath::Folder(folder)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Folder(folder) => folder.fmt(f),
            KeyPath::Key(key) => write!(f, "{}", String::from_utf8_lossy(key.as_bytes())),
        }
    }
}
