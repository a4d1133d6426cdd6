//! Fully buffered zip archive filesystem.
//!
//! [`ZipArchiveFileSystem`] decompresses every entry when the archive
//! is opened and serves all operations from those in-memory copies.
//! Changes are visible immediately and streams seek natively; the
//! backing stream is rewritten once, on close, and only when something
//! was changed. This trades memory for simplicity next to
//! [`ZipContainerFileSystem`](crate::ZipContainerFileSystem), which
//! keeps content compressed and goes through update transactions.

use std::collections::BTreeSet;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use zipfs_core::{Error, FileSystem, MemoryFile, OpenMode, Result, VfsPath, VfsStream};

use crate::container::map_zip_error;
use crate::filesystem::{entry_name, entry_path};

struct ArchiveEntry {
    name: String,
    file: MemoryFile,
}

impl ArchiveEntry {
    fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

struct ArchiveState<S> {
    backing: S,
    entries: Vec<ArchiveEntry>,
    dirty: bool,
}

impl<S> ArchiveState<S> {
    fn entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    fn entry_position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }
}

/// Filesystem over a zip archive held uncompressed in memory.
///
/// Clones share state, so entities created through one handle are
/// immediately visible through the others.
pub struct ZipArchiveFileSystem<S> {
    state: Arc<Mutex<ArchiveState<S>>>,
}

impl<S> Clone for ZipArchiveFileSystem<S> {
    fn clone(&self) -> Self {
        ZipArchiveFileSystem {
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: VfsStream + 'static> ZipArchiveFileSystem<S> {
    /// Opens an existing archive, decompressing every entry.
    pub fn open(mut backing: S) -> Result<Self> {
        let mut archive = ZipArchive::new(&mut backing).map_err(map_zip_error)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive.by_index(index).map_err(map_zip_error)?;
            let mut content = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut content)?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                file: MemoryFile::from_bytes(content),
            });
        }
        drop(archive);
        debug!("opened archive with {} entries", entries.len());
        Ok(Self::from_state(ArchiveState {
            backing,
            entries,
            dirty: false,
        }))
    }

    /// Starts an empty archive. The backing stream receives the
    /// archive image on close.
    pub fn create(backing: S) -> Self {
        Self::from_state(ArchiveState {
            backing,
            entries: Vec::new(),
            dirty: true,
        })
    }

    fn from_state(state: ArchiveState<S>) -> Self {
        ZipArchiveFileSystem {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ArchiveState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry_paths(&self) -> Vec<VfsPath> {
        self.lock()
            .entries
            .iter()
            .filter_map(|entry| entry_path(&entry.name))
            .collect()
    }
}

impl<S: VfsStream + 'static> FileSystem for ZipArchiveFileSystem<S> {
    fn exists(&self, path: &VfsPath) -> Result<bool> {
        trace!("exists({})", path);
        if path.is_file() {
            return Ok(self.lock().entry(entry_name(path)).is_some());
        }
        let found = self
            .entry_paths()
            .iter()
            .any(|entry| path.is_parent_of(entry) || entry == path);
        Ok(found)
    }

    fn entities(&self, path: &VfsPath) -> Result<BTreeSet<VfsPath>> {
        trace!("entities({})", path);
        if !path.is_directory() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        let mut children = BTreeSet::new();
        for entry in self.entry_paths() {
            if let Some(child) = entry.immediate_child_of(path) {
                children.insert(child);
            }
        }
        Ok(children)
    }

    fn create_file(&self, path: &VfsPath) -> Result<Box<dyn VfsStream>> {
        if !path.is_file() {
            return Err(Error::NotAFile(path.to_string()));
        }
        debug!("create_file({})", path);
        let name = entry_name(path).to_string();
        let file = MemoryFile::new();
        let mut state = self.lock();
        match state.entry_position(&name) {
            Some(index) => state.entries[index].file = file.clone(),
            None => state.entries.push(ArchiveEntry {
                name,
                file: file.clone(),
            }),
        }
        state.dirty = true;
        Ok(Box::new(file.stream()))
    }

    fn open_file(&self, path: &VfsPath, mode: OpenMode) -> Result<Box<dyn VfsStream>> {
        if !path.is_file() {
            return Err(Error::NotAFile(path.to_string()));
        }
        trace!("open_file({}, {:?})", path, mode);
        let mut state = self.lock();
        let file = state
            .entry(entry_name(path))
            .map(|entry| entry.file.clone())
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        if mode.is_write() {
            state.dirty = true;
        }
        Ok(Box::new(file.stream()))
    }

    fn create_directory(&self, path: &VfsPath) -> Result<()> {
        if !path.is_directory() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        if path.is_root() || self.exists(path)? {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        debug!("create_directory({})", path);
        let mut state = self.lock();
        state.entries.push(ArchiveEntry {
            name: entry_name(path).to_string(),
            file: MemoryFile::new(),
        });
        state.dirty = true;
        Ok(())
    }

    fn delete(&self, path: &VfsPath) -> Result<()> {
        if path.is_root() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        debug!("delete({})", path);
        let name = entry_name(path);
        let mut state = self.lock();
        let index = state
            .entry_position(name)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        state.entries.remove(index);
        state.dirty = true;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.dirty {
            return Ok(());
        }
        debug!("close: rewriting archive with {} entries", state.entries.len());
        let options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &state.entries {
            if entry.is_dir() {
                writer
                    .add_directory(entry.name.as_str(), options)
                    .map_err(map_zip_error)?;
            } else {
                writer
                    .start_file(entry.name.as_str(), options)
                    .map_err(map_zip_error)?;
                writer.write_all(&entry.file.to_vec())?;
            }
        }
        let image = writer.finish().map_err(map_zip_error)?.into_inner();
        state.backing.set_len(0)?;
        state.backing.seek(SeekFrom::Start(0))?;
        state.backing.write_all(&image)?;
        state.backing.flush()?;
        state.dirty = false;
        Ok(())
    }
}
