//! # zipfs-zip
//!
//! Zip archive backends for the `zipfs-core` filesystem contract.
//!
//! This crate provides:
//! - A transactional container filesystem that keeps entries compressed
//!   and commits every completed write back into the archive
//! - A fully buffered archive filesystem that decompresses everything up
//!   front and rewrites the backing stream on close
//! - Seek emulation over forward-only entry streams
//!
//! ## Example
//!
//! ```ignore
//! use std::io::Write;
//! use zipfs_zip::{FileSystem, MemoryFile, VfsPath, ZipContainerFileSystem};
//!
//! let backing = MemoryFile::new();
//! let fs = ZipContainerFileSystem::create(backing.stream());
//!
//! let path = VfsPath::parse("/notes.txt")?;
//! let mut stream = fs.create_file(&path)?;
//! stream.write_all(b"this is a file")?;
//! drop(stream);
//! fs.close()?;
//!
//! // `backing` now holds a complete zip archive.
//! let reopened = ZipContainerFileSystem::open(backing.stream())?;
//! assert!(reopened.exists(&path)?);
//! ```

mod archive;
mod container;
mod filesystem;
mod seek;

pub use archive::ZipArchiveFileSystem;
pub use container::{EntryReader, ZipContainer, ZipEntry};
pub use filesystem::ZipContainerFileSystem;
pub use seek::{SeekStream, ShadowBuffer, DEFAULT_CHUNK_SIZE};

// Re-export zipfs-core types for convenience
pub use zipfs_core::{
    Error, FileSystem, MemoryFile, MemoryFileStream, MemoryFileSystem, OpenMode, Result, VfsPath,
    VfsStream, SEPARATOR,
};
