//! In-memory files and the in-memory filesystem.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{Error, FileSystem, OpenMode, Result, VfsPath, VfsStream};

/// A growable in-memory byte buffer with shared ownership.
///
/// Clones share content. Besides backing [`MemoryFileSystem`] entries, a
/// `MemoryFile` serves as the pending data source for archive updates: one
/// handle is registered with the archive while another receives writes
/// through a stream.
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    content: Arc<Mutex<Vec<u8>>>,
}

impl MemoryFile {
    /// Creates an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a file holding `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        MemoryFile {
            content: Arc::new(Mutex::new(bytes.into())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.content.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current content length in bytes.
    pub fn len(&self) -> u64 {
        self.lock().len() as u64
    }

    /// Whether the content is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies the current content out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Copies up to `buf.len()` bytes starting at `offset` into `buf`.
    ///
    /// Returns the number of bytes copied; 0 at or past the end.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        let content = self.lock();
        if offset >= content.len() as u64 {
            return 0;
        }
        let start = offset as usize;
        let n = buf.len().min(content.len() - start);
        buf[..n].copy_from_slice(&content[start..start + n]);
        n
    }

    /// Writes `bytes` at `offset`, zero-filling any gap between the old
    /// end and `offset` and extending the content as needed.
    pub fn write_at(&self, offset: u64, bytes: &[u8]) {
        let mut content = self.lock();
        let start = offset as usize;
        let end = start + bytes.len();
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(bytes);
    }

    /// Truncates or zero-extends the content to `size` bytes.
    pub fn set_len(&self, size: u64) {
        self.lock().resize(size as usize, 0);
    }

    /// Opens a new independent cursor over this file.
    pub fn stream(&self) -> MemoryFileStream {
        MemoryFileStream {
            file: self.clone(),
            position: 0,
        }
    }
}

/// A positioned cursor over a [`MemoryFile`].
///
/// Cursors are independent; the content is shared.
#[derive(Debug, Clone)]
pub struct MemoryFileStream {
    file: MemoryFile,
    position: u64,
}

impl MemoryFileStream {
    /// Opens a cursor at position 0.
    pub fn new(file: MemoryFile) -> Self {
        file.stream()
    }

    /// The file backing this cursor.
    pub fn file(&self) -> &MemoryFile {
        &self.file
    }
}

impl Read for MemoryFileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read_at(self.position, buf);
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for MemoryFileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_at(self.position, buf);
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryFileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.file.len() as i128 + delta as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}

impl VfsStream for MemoryFileStream {
    fn len(&self) -> u64 {
        self.file.len()
    }

    fn set_len(&mut self, size: u64) -> Result<()> {
        self.file.set_len(size);
        Ok(())
    }
}

/// A minimal in-memory [`FileSystem`].
///
/// Files are [`MemoryFile`]s keyed by path; directories are tracked
/// explicitly and the root always exists. Enumerating a missing directory
/// is an error, unlike the archive backends which treat unknown prefixes
/// as empty.
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    inner: Arc<Mutex<MemoryFsInner>>,
}

#[derive(Debug)]
struct MemoryFsInner {
    files: BTreeMap<VfsPath, MemoryFile>,
    directories: BTreeSet<VfsPath>,
}

impl MemoryFileSystem {
    /// Creates an empty filesystem containing only the root directory.
    pub fn new() -> Self {
        let mut directories = BTreeSet::new();
        directories.insert(VfsPath::root());
        MemoryFileSystem {
            inner: Arc::new(Mutex::new(MemoryFsInner {
                files: BTreeMap::new(),
                directories,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryFsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &VfsPath) -> Result<bool> {
        let inner = self.lock();
        Ok(if path.is_directory() {
            inner.directories.contains(path)
        } else {
            inner.files.contains_key(path)
        })
    }

    fn entities(&self, path: &VfsPath) -> Result<BTreeSet<VfsPath>> {
        let inner = self.lock();
        if !inner.directories.contains(path) {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(inner
            .files
            .keys()
            .chain(inner.directories.iter())
            .filter(|candidate| candidate.parent().as_ref() == Some(path))
            .cloned()
            .collect())
    }

    fn create_file(&self, path: &VfsPath) -> Result<Box<dyn VfsStream>> {
        if !path.is_file() {
            return Err(Error::NotAFile(path.to_string()));
        }
        let parent = path
            .parent()
            .ok_or_else(|| Error::InvalidPath(path.to_string()))?;
        let mut inner = self.lock();
        if !inner.directories.contains(&parent) {
            return Err(Error::NotFound(parent.to_string()));
        }
        let file = MemoryFile::new();
        inner.files.insert(path.clone(), file.clone());
        Ok(Box::new(file.stream()))
    }

    fn open_file(&self, path: &VfsPath, _mode: OpenMode) -> Result<Box<dyn VfsStream>> {
        if !path.is_file() {
            return Err(Error::NotAFile(path.to_string()));
        }
        let inner = self.lock();
        let file = inner
            .files
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        Ok(Box::new(file.stream()))
    }

    fn create_directory(&self, path: &VfsPath) -> Result<()> {
        if !path.is_directory() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        let mut inner = self.lock();
        if inner.directories.contains(path) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        let parent = path
            .parent()
            .ok_or_else(|| Error::InvalidPath(path.to_string()))?;
        if !inner.directories.contains(&parent) {
            return Err(Error::NotFound(parent.to_string()));
        }
        inner.directories.insert(path.clone());
        Ok(())
    }

    fn delete(&self, path: &VfsPath) -> Result<()> {
        if path.is_root() {
            return Err(Error::InvalidPath(
                "cannot delete the root directory".to_string(),
            ));
        }
        let mut inner = self.lock();
        if path.is_directory() {
            if !inner.directories.remove(path) {
                return Err(Error::NotFound(path.to_string()));
            }
            inner.directories.retain(|dir| !path.is_parent_of(dir));
            inner.files.retain(|file, _| !path.is_parent_of(file));
            Ok(())
        } else if inner.files.remove(path).is_some() {
            Ok(())
        } else {
            Err(Error::NotFound(path.to_string()))
        }
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> VfsPath {
        VfsPath::parse(s).unwrap()
    }

    #[test]
    fn stream_reads_and_writes_shared_content() {
        let file = MemoryFile::new();
        let mut writer = file.stream();
        writer.write_all(b"hello world").unwrap();

        let mut reader = file.stream();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello world");
        assert_eq!(file.len(), 11);
    }

    #[test]
    fn stream_seeks_and_overwrites() {
        let file = MemoryFile::from_bytes(b"this is a file".to_vec());
        let mut stream = file.stream();
        stream.seek(SeekFrom::Start(8)).unwrap();
        stream.write_all(b"c").unwrap();
        assert_eq!(file.to_vec(), b"this is c file");
    }

    #[test]
    fn write_past_end_zero_fills() {
        let file = MemoryFile::new();
        let mut stream = file.stream();
        stream.seek(SeekFrom::Start(4)).unwrap();
        stream.write_all(b"x").unwrap();
        assert_eq!(file.to_vec(), vec![0, 0, 0, 0, b'x']);
    }

    #[test]
    fn set_len_truncates_and_extends() {
        let file = MemoryFile::from_bytes(b"abcdef".to_vec());
        let mut stream = file.stream();
        stream.set_len(3).unwrap();
        assert_eq!(file.to_vec(), b"abc");
        stream.set_len(5).unwrap();
        assert_eq!(file.to_vec(), vec![b'a', b'b', b'c', 0, 0]);
    }

    #[test]
    fn filesystem_creates_and_lists_entities() {
        let fs = MemoryFileSystem::new();
        fs.create_directory(&p("/docs/")).unwrap();
        let mut readme = fs.create_file(&p("/docs/readme.txt")).unwrap();
        readme.write_all(b"hi").unwrap();
        fs.create_file(&p("/top.txt")).unwrap();

        assert!(fs.exists(&p("/docs/")).unwrap());
        assert!(fs.exists(&p("/docs/readme.txt")).unwrap());
        let root = fs.entities(&VfsPath::root()).unwrap();
        assert_eq!(root, [p("/docs/"), p("/top.txt")].into_iter().collect());
        let docs = fs.entities(&p("/docs/")).unwrap();
        assert_eq!(docs, [p("/docs/readme.txt")].into_iter().collect());
    }

    #[test]
    fn entities_of_missing_directory_fails() {
        let fs = MemoryFileSystem::new();
        assert!(matches!(fs.entities(&p("/nope/")), Err(Error::NotFound(_))));
    }

    #[test]
    fn open_missing_file_fails() {
        let fs = MemoryFileSystem::new();
        assert!(matches!(
            fs.open_file(&p("/ghost.txt"), OpenMode::Read),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_directory_fails() {
        let fs = MemoryFileSystem::new();
        fs.create_directory(&p("/docs/")).unwrap();
        assert!(matches!(
            fs.create_directory(&p("/docs/")),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn delete_directory_removes_subtree() {
        let fs = MemoryFileSystem::new();
        fs.create_directory(&p("/docs/")).unwrap();
        fs.create_directory(&p("/docs/img/")).unwrap();
        fs.create_file(&p("/docs/readme.txt")).unwrap();

        fs.delete(&p("/docs/")).unwrap();
        assert!(!fs.exists(&p("/docs/")).unwrap());
        assert!(!fs.exists(&p("/docs/img/")).unwrap());
        assert!(!fs.exists(&p("/docs/readme.txt")).unwrap());
        assert!(fs.delete(&p("/docs/")).is_err());
        assert!(fs.delete(&VfsPath::root()).is_err());
    }
}
