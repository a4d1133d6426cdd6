//! The filesystem contract shared by every backend.

use std::collections::BTreeSet;
use std::io::{Read, Seek, Write};

use crate::{Result, VfsPath};

/// Access mode for [`FileSystem::open_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only access.
    Read,
    /// Write access.
    Write,
    /// Combined read and write access.
    ReadWrite,
}

impl OpenMode {
    /// Whether this mode allows writing.
    pub fn is_write(self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::ReadWrite)
    }
}

/// A positioned byte stream handed out by a filesystem.
///
/// Extends the std I/O traits with the explicit length surface the
/// filesystem contract needs: every stream knows its current length, and
/// backends that cannot change it report
/// [`Error::Unsupported`](crate::Error::Unsupported) from
/// [`set_len`](VfsStream::set_len).
pub trait VfsStream: Read + Write + Seek + Send {
    /// Current length of the stream content in bytes.
    fn len(&self) -> u64;

    /// Whether the stream content is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Truncates or extends the stream content.
    fn set_len(&mut self, size: u64) -> Result<()>;
}

impl<T: VfsStream + ?Sized> VfsStream for Box<T> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn set_len(&mut self, size: u64) -> Result<()> {
        (**self).set_len(size)
    }
}

/// A hierarchical filesystem of files and directories.
///
/// Methods take `&self`; implementations guard their state internally so
/// that streams can keep a handle back to the filesystem that produced
/// them.
pub trait FileSystem {
    /// Whether an entity exists at `path`.
    fn exists(&self, path: &VfsPath) -> Result<bool>;

    /// The entities directly below the directory `path`.
    fn entities(&self, path: &VfsPath) -> Result<BTreeSet<VfsPath>>;

    /// Creates (or replaces) the file at `path` and opens it for writing.
    fn create_file(&self, path: &VfsPath) -> Result<Box<dyn VfsStream>>;

    /// Opens the file at `path`.
    fn open_file(&self, path: &VfsPath, mode: OpenMode) -> Result<Box<dyn VfsStream>>;

    /// Creates the directory at `path`.
    fn create_directory(&self, path: &VfsPath) -> Result<()>;

    /// Removes the entity at `path`.
    fn delete(&self, path: &VfsPath) -> Result<()>;

    /// Flushes outstanding state and releases the filesystem.
    fn close(&self) -> Result<()>;
}
