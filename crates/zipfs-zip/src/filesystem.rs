//! Filesystem facade over a transactional zip container.

use std::collections::BTreeSet;
use std::io::{Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace, warn};

use zipfs_core::{
    Error, FileSystem, MemoryFile, OpenMode, Result, VfsPath, VfsStream, SEPARATOR,
};

use crate::container::{EntryStream, ZipContainer};
use crate::seek::SeekStream;

/// Hierarchical filesystem over the entries of a zip archive.
///
/// Rooted paths map one-to-one onto entry names: `/a/b.txt` is the
/// entry `a/b.txt`, `/a/` is the directory marker `a/`. Queries always
/// observe committed archive state. Writable streams run through
/// [`SeekStream`], and every completed write commits the full entry
/// content back into the archive; a stream that is never written to
/// leaves the committed entry untouched.
///
/// Clones share one container, so a clone can keep querying while a
/// stream handed out earlier is still being written.
pub struct ZipContainerFileSystem<S> {
    container: Arc<Mutex<ZipContainer<S>>>,
}

impl<S> Clone for ZipContainerFileSystem<S> {
    fn clone(&self) -> Self {
        ZipContainerFileSystem {
            container: Arc::clone(&self.container),
        }
    }
}

impl<S: VfsStream + 'static> ZipContainerFileSystem<S> {
    /// Opens the filesystem over an existing zip archive.
    pub fn open(backing: S) -> Result<Self> {
        Ok(Self::from_container(ZipContainer::open(backing)?))
    }

    /// Starts the filesystem over an empty archive. `backing` receives
    /// the archive image on the first commit.
    pub fn create(backing: S) -> Self {
        Self::from_container(ZipContainer::create(backing))
    }

    fn from_container(container: ZipContainer<S>) -> Self {
        ZipContainerFileSystem {
            container: Arc::new(Mutex::new(container)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ZipContainer<S>> {
        lock(&self.container)
    }

    /// Committed entry names as rooted paths. Entries whose names do
    /// not map onto a rooted path are skipped.
    fn entry_paths(&self) -> Vec<VfsPath> {
        self.lock()
            .entries()
            .iter()
            .filter_map(|entry| entry_path(entry.name()))
            .collect()
    }

    /// Commit hook for a writable stream on `name`: every completed
    /// write re-stages the pending content and commits it, so the
    /// archive always holds the latest fully written state.
    fn commit_hook(
        &self,
        name: String,
        pending: MemoryFile,
    ) -> Box<dyn FnMut() -> Result<()> + Send> {
        let container = Arc::clone(&self.container);
        Box::new(move || {
            let mut container = lock(&container);
            container.begin_update();
            container.put_entry(&name, pending.clone())?;
            container.commit_update()
        })
    }
}

impl<S: VfsStream + 'static> FileSystem for ZipContainerFileSystem<S> {
    fn exists(&self, path: &VfsPath) -> Result<bool> {
        trace!("exists({})", path);
        if path.is_file() {
            return Ok(self.lock().entry(entry_name(path)).is_some());
        }
        // A directory exists when it is a proper ancestor of some
        // entry or has its own marker entry.
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
        let pending = MemoryFile::new();
        {
            // Stage the entry right away so a created file lands in
            // the archive even if nothing is ever written to it.
            let mut container = self.lock();
            container.begin_update();
            container.put_entry(&name, pending.clone())?;
        }
        let hook = self.commit_hook(name, pending.clone());
        into_seekable(EntryStream::pending(pending.stream()), Some(hook))
    }

    fn open_file(&self, path: &VfsPath, mode: OpenMode) -> Result<Box<dyn VfsStream>> {
        if !path.is_file() {
            return Err(Error::NotAFile(path.to_string()));
        }
        trace!("open_file({}, {:?})", path, mode);
        let name = entry_name(path).to_string();
        let reader = self.lock().entry_reader(&name)?;
        if !mode.is_write() {
            return into_seekable(EntryStream::reader(reader), None);
        }
        // The committed entry is not staged here. The first completed
        // write stages and commits replacement content through the
        // hook; until then the entry keeps its committed bytes.
        let pending = MemoryFile::new();
        let hook = self.commit_hook(name, pending.clone());
        into_seekable(EntryStream::rewrite(reader, pending.stream()), Some(hook))
    }

    fn create_directory(&self, path: &VfsPath) -> Result<()> {
        if !path.is_directory() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        if path.is_root() || self.exists(path)? {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        debug!("create_directory({})", path);
        let name = entry_name(path).to_string();
        let mut container = self.lock();
        let was_updating = container.is_updating();
        container.begin_update();
        container.put_entry(&name, MemoryFile::new())?;
        if !was_updating {
            container.commit_update()?;
        }
        Ok(())
    }

    fn delete(&self, path: &VfsPath) -> Result<()> {
        if path.is_root() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        debug!("delete({})", path);
        let name = entry_name(path).to_string();
        let mut container = self.lock();
        if container.is_updating() {
            // Fold into the open transaction; the owner commits.
            return container.remove_entry(&name);
        }
        if container.entry(&name).is_none() {
            return Err(Error::NotFound(path.to_string()));
        }
        container.begin_update();
        container.remove_entry(&name)?;
        container.commit_update()
    }

    fn close(&self) -> Result<()> {
        let mut container = self.lock();
        if container.is_updating() {
            debug!("close: committing open update");
            container.commit_update()?;
        }
        Ok(())
    }
}

fn lock<S>(container: &Arc<Mutex<ZipContainer<S>>>) -> MutexGuard<'_, ZipContainer<S>> {
    container.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The zip-internal entry name for a rooted path.
pub(crate) fn entry_name(path: &VfsPath) -> &str {
    &path.as_str()[1..]
}

/// The rooted path for a zip-internal entry name, or `None` (with a
/// warning) when the name does not map onto one.
pub(crate) fn entry_path(name: &str) -> Option<VfsPath> {
    let raw = format!("{}{}", SEPARATOR, name);
    match VfsPath::parse(&raw) {
        Ok(path) => Some(path),
        Err(error) => {
            warn!("skipping unmappable entry '{}': {}", name, error);
            None
        }
    }
}

/// Wraps an entry stream in the seek adapter, pulling committed
/// content through once so the stream starts at the beginning with the
/// full entry buffered behind the cursor.
fn into_seekable(
    entry: EntryStream,
    hook: Option<Box<dyn FnMut() -> Result<()> + Send>>,
) -> Result<Box<dyn VfsStream>> {
    let mut stream = SeekStream::new(entry);
    if let Some(hook) = hook {
        stream.on_data_written(hook);
    }
    stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;
    Ok(Box::new(stream))
}
