//! # zipfs-core
//!
//! Contract layer for the zipfs virtual filesystems.
//!
//! This crate provides:
//! - Rooted virtual paths with the trailing-slash directory convention
//! - The [`FileSystem`] trait implemented by every backend
//! - The [`VfsStream`] trait for positioned streams that carry an explicit
//!   length surface on top of the std I/O traits
//! - In-memory files, cursors, and a minimal in-memory filesystem
//!
//! ## Example
//!
//! ```ignore
//! use std::io::Write;
//! use zipfs_core::{FileSystem, MemoryFileSystem, VfsPath};
//!
//! let fs = MemoryFileSystem::new();
//! let path = VfsPath::parse("/notes.txt")?;
//! let mut stream = fs.create_file(&path)?;
//! stream.write_all(b"hello")?;
//! assert!(fs.exists(&path)?);
//! ```

mod error;
mod fs;
mod memory;
mod path;

pub use error::{Error, Result};
pub use fs::{FileSystem, OpenMode, VfsStream};
pub use memory::{MemoryFile, MemoryFileStream, MemoryFileSystem};
pub use path::{VfsPath, SEPARATOR};
