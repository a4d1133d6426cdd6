//! Transactional zip containers.
//!
//! [`ZipContainer`] keeps the committed central-directory view of one
//! zip archive and stages changes inside an explicit update
//! transaction. Readers hand out owned, forward-only entry content
//! ([`EntryReader`]); commits rewrite the whole archive through
//! `zip::ZipWriter` and re-parse the result, so committed state is
//! immediately queryable again.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use flate2::bufread::DeflateDecoder;
use log::{debug, trace};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use zipfs_core::{Error, MemoryFile, MemoryFileStream, Result, VfsStream};

pub(crate) fn map_zip_error(err: ZipError) -> Error {
    Error::Archive(err.to_string())
}

/// Committed metadata of one archive entry.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    name: String,
    size: u64,
    compressed_size: u64,
    data_offset: u64,
    method: CompressionMethod,
}

impl ZipEntry {
    /// The zip-internal entry name. No leading separator; directory
    /// markers end with `/`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uncompressed content size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether this entry is a directory marker.
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

enum Change {
    Put(MemoryFile),
    Remove,
}

#[derive(Default)]
struct UpdateState {
    changes: Vec<(String, Change)>,
}

impl UpdateState {
    fn change_for(&self, name: &str) -> Option<&Change> {
        self.changes.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    fn take_change(&mut self, name: &str) -> Option<Change> {
        let index = self.changes.iter().position(|(n, _)| n == name)?;
        Some(self.changes.remove(index).1)
    }
}

/// A zip archive over a backing stream, with explicit update
/// transactions.
///
/// Queries observe committed state only; staged changes become visible
/// when [`ZipContainer::commit_update`] rewrites the backing stream.
pub struct ZipContainer<S> {
    backing: S,
    entries: Vec<ZipEntry>,
    update: Option<UpdateState>,
}

impl<S: VfsStream> ZipContainer<S> {
    /// Opens an existing archive from `backing`.
    pub fn open(mut backing: S) -> Result<Self> {
        let entries = read_entries(&mut backing)?;
        Ok(ZipContainer {
            backing,
            entries,
            update: None,
        })
    }

    /// Starts an empty archive over `backing`. Nothing is written
    /// until the first commit.
    pub fn create(backing: S) -> Self {
        ZipContainer {
            backing,
            entries: Vec::new(),
            update: None,
        }
    }

    /// The committed entries, in archive order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Looks up a committed entry by exact name.
    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Whether an update transaction is open.
    pub fn is_updating(&self) -> bool {
        self.update.is_some()
    }

    /// Opens an update transaction. Calling again while one is open
    /// folds into the same transaction.
    pub fn begin_update(&mut self) {
        if self.update.is_none() {
            trace!("opening update transaction");
            self.update = Some(UpdateState::default());
        }
    }

    /// Stages an add-or-replace of `name`, with content drawn from
    /// `source` at commit time.
    pub fn put_entry(&mut self, name: &str, source: MemoryFile) -> Result<()> {
        let update = self.require_update()?;
        update.take_change(name);
        update.changes.push((name.to_string(), Change::Put(source)));
        Ok(())
    }

    /// Stages removal of the entry `name`.
    ///
    /// Fails with [`Error::NotFound`] when `name` is neither committed
    /// nor staged.
    pub fn remove_entry(&mut self, name: &str) -> Result<()> {
        let committed = self.entry(name).is_some();
        let update = self.require_update()?;
        let had_pending = update.take_change(name).is_some();
        if committed {
            update.changes.push((name.to_string(), Change::Remove));
            Ok(())
        } else if had_pending {
            Ok(())
        } else {
            Err(Error::NotFound(name.to_string()))
        }
    }

    /// Opens an owned forward-only reader over the committed content
    /// of `name`.
    pub fn entry_reader(&mut self, name: &str) -> Result<EntryReader> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.name == name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        open_entry_reader(&mut self.backing, &entry)
    }

    /// Rewrites the archive with all staged changes applied and
    /// refreshes the committed view from the result.
    pub fn commit_update(&mut self) -> Result<()> {
        let update = self
            .update
            .take()
            .ok_or(Error::Unsupported("commit without an open update"))?;

        let options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        // Committed entries without a staged change are carried over.
        let survivors: Vec<ZipEntry> = self
            .entries
            .iter()
            .filter(|entry| update.change_for(&entry.name).is_none())
            .cloned()
            .collect();
        for entry in &survivors {
            if entry.is_dir() {
                writer
                    .add_directory(entry.name.as_str(), options)
                    .map_err(map_zip_error)?;
                continue;
            }
            let mut reader = open_entry_reader(&mut self.backing, entry)?;
            writer
                .start_file(entry.name.as_str(), options)
                .map_err(map_zip_error)?;
            io::copy(&mut reader, &mut writer)?;
        }

        let mut staged = 0usize;
        for (name, change) in &update.changes {
            let Change::Put(source) = change else { continue };
            staged += 1;
            if name.ends_with('/') {
                writer
                    .add_directory(name.as_str(), options)
                    .map_err(map_zip_error)?;
            } else {
                writer
                    .start_file(name.as_str(), options)
                    .map_err(map_zip_error)?;
                writer.write_all(&source.to_vec())?;
            }
        }

        let image = writer.finish().map_err(map_zip_error)?.into_inner();
        self.backing.set_len(0)?;
        self.backing.seek(SeekFrom::Start(0))?;
        self.backing.write_all(&image)?;
        self.backing.flush()?;
        self.entries = read_entries(&mut self.backing)?;
        debug!(
            "committed update: {} carried over, {} staged, {} bytes",
            survivors.len(),
            staged,
            image.len()
        );
        Ok(())
    }

    /// Releases the container, returning the backing stream.
    pub fn into_inner(self) -> S {
        self.backing
    }

    fn require_update(&mut self) -> Result<&mut UpdateState> {
        self.update
            .as_mut()
            .ok_or(Error::Unsupported("entry change outside an update"))
    }
}

/// Parses the central directory of the archive behind `backing`.
fn read_entries<S: VfsStream>(backing: &mut S) -> Result<Vec<ZipEntry>> {
    let mut archive = ZipArchive::new(&mut *backing).map_err(map_zip_error)?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive.by_index_raw(index).map_err(map_zip_error)?;
        entries.push(ZipEntry {
            name: file.name().to_string(),
            size: file.size(),
            compressed_size: file.compressed_size(),
            data_offset: file.data_start(),
            method: file.compression(),
        });
    }
    Ok(entries)
}

/// Copies the raw bytes of `entry` out of `backing` and wraps them in
/// an owned reader, decoding on the fly where needed.
fn open_entry_reader<S: VfsStream>(backing: &mut S, entry: &ZipEntry) -> Result<EntryReader> {
    backing.seek(SeekFrom::Start(entry.data_offset))?;
    let mut compressed = vec![0u8; entry.compressed_size as usize];
    backing.read_exact(&mut compressed)?;
    EntryReader::new(compressed, entry.method)
}

/// Owned forward-only reader over one committed entry's content.
///
/// Stored entries read straight from the raw bytes; deflated entries
/// stream through a deflate decoder. Either way the reader only moves
/// forward, which is what [`SeekStream`](crate::SeekStream) exists to
/// compensate for.
pub struct EntryReader {
    inner: ReaderKind,
}

enum ReaderKind {
    Stored(Cursor<Vec<u8>>),
    Deflated(DeflateDecoder<Cursor<Vec<u8>>>),
}

impl EntryReader {
    fn new(compressed: Vec<u8>, method: CompressionMethod) -> Result<Self> {
        let inner = match method {
            CompressionMethod::Stored => ReaderKind::Stored(Cursor::new(compressed)),
            CompressionMethod::Deflated => {
                ReaderKind::Deflated(DeflateDecoder::new(Cursor::new(compressed)))
            }
            other => {
                return Err(Error::Archive(format!(
                    "unsupported compression method: {other:?}"
                )))
            }
        };
        Ok(EntryReader { inner })
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            ReaderKind::Stored(cursor) => cursor.read(buf),
            ReaderKind::Deflated(decoder) => decoder.read(buf),
        }
    }
}

/// The stream handed to the seek adapter for one open entry: reads
/// drain the committed content, writes land in the pending data file.
///
/// Seeking repositions the pending sink only; the read side stays
/// forward-only. Read-only streams have no sink and reject writes and
/// seeks.
pub(crate) struct EntryStream {
    source: Option<EntryReader>,
    sink: Option<MemoryFileStream>,
}

impl EntryStream {
    /// Read-only stream over committed content.
    pub(crate) fn reader(source: EntryReader) -> Self {
        EntryStream {
            source: Some(source),
            sink: None,
        }
    }

    /// Write-only stream for a freshly created entry.
    pub(crate) fn pending(sink: MemoryFileStream) -> Self {
        EntryStream {
            source: None,
            sink: Some(sink),
        }
    }

    /// Read-write stream: committed content in, replacement content
    /// out.
    pub(crate) fn rewrite(source: EntryReader, sink: MemoryFileStream) -> Self {
        EntryStream {
            source: Some(source),
            sink: Some(sink),
        }
    }

    fn sink(&mut self) -> io::Result<&mut MemoryFileStream> {
        self.sink.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, "entry stream opened read-only")
        })
    }
}

impl Read for EntryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.source.as_mut() {
            Some(source) => source.read(buf),
            None => Ok(0),
        }
    }
}

impl Write for EntryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl Seek for EntryStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.sink()?.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(method: CompressionMethod) -> MemoryFile {
        let file = MemoryFile::new();
        let mut writer = ZipWriter::new(file.stream());
        let options: FileOptions<()> = FileOptions::default().compression_method(method);
        writer.start_file("textfileA.txt", options).unwrap();
        writer.write_all(b"this is a file").unwrap();
        writer
            .start_file("directory/fileInDirectory.txt", options)
            .unwrap();
        writer.finish().unwrap();
        file
    }

    fn read_all(mut reader: EntryReader) -> Vec<u8> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        data
    }

    #[test]
    fn open_parses_the_committed_view() {
        let mut container =
            ZipContainer::open(fixture(CompressionMethod::Stored).stream()).unwrap();
        assert_eq!(container.entries().len(), 2);
        assert_eq!(container.entry("textfileA.txt").unwrap().size(), 14);
        assert!(container.entry("missing.txt").is_none());
        assert_eq!(
            read_all(container.entry_reader("textfileA.txt").unwrap()),
            b"this is a file"
        );
    }

    #[test]
    fn deflated_entries_decode() {
        let mut container =
            ZipContainer::open(fixture(CompressionMethod::Deflated).stream()).unwrap();
        assert_eq!(
            read_all(container.entry_reader("textfileA.txt").unwrap()),
            b"this is a file"
        );
    }

    #[test]
    fn begin_update_is_idempotent() {
        let mut container = ZipContainer::create(MemoryFile::new().stream());
        assert!(!container.is_updating());
        container.begin_update();
        container.begin_update();
        assert!(container.is_updating());
        container.commit_update().unwrap();
        assert!(!container.is_updating());
    }

    #[test]
    fn changes_require_an_open_update() {
        let mut container = ZipContainer::create(MemoryFile::new().stream());
        assert!(matches!(
            container.put_entry("a.txt", MemoryFile::new()),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            container.commit_update(),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn staged_changes_are_invisible_until_commit() {
        let mut container = ZipContainer::create(MemoryFile::new().stream());
        container.begin_update();
        container
            .put_entry("a.txt", MemoryFile::from_bytes(b"alpha".to_vec()))
            .unwrap();
        assert!(container.entry("a.txt").is_none());
        container.commit_update().unwrap();
        assert_eq!(read_all(container.entry_reader("a.txt").unwrap()), b"alpha");
    }

    #[test]
    fn commit_preserves_untouched_entries() {
        let backing = fixture(CompressionMethod::Stored);
        let mut container = ZipContainer::open(backing.stream()).unwrap();
        container.begin_update();
        container
            .put_entry("b.txt", MemoryFile::from_bytes(b"beta".to_vec()))
            .unwrap();
        container
            .remove_entry("directory/fileInDirectory.txt")
            .unwrap();
        container.commit_update().unwrap();

        assert!(container.entry("textfileA.txt").is_some());
        assert!(container.entry("b.txt").is_some());
        assert!(container.entry("directory/fileInDirectory.txt").is_none());
        assert_eq!(
            read_all(container.entry_reader("textfileA.txt").unwrap()),
            b"this is a file"
        );

        // The backing stream itself now holds the new archive.
        let mut reopened = ZipContainer::open(backing.stream()).unwrap();
        assert_eq!(read_all(reopened.entry_reader("b.txt").unwrap()), b"beta");
    }

    #[test]
    fn a_put_supersedes_a_staged_removal() {
        let backing = fixture(CompressionMethod::Stored);
        let mut container = ZipContainer::open(backing.stream()).unwrap();
        container.begin_update();
        container.remove_entry("textfileA.txt").unwrap();
        container
            .put_entry("textfileA.txt", MemoryFile::from_bytes(b"new".to_vec()))
            .unwrap();
        container.commit_update().unwrap();
        assert_eq!(
            read_all(container.entry_reader("textfileA.txt").unwrap()),
            b"new"
        );
    }

    #[test]
    fn directory_markers_survive_commits() {
        let mut container = ZipContainer::create(MemoryFile::new().stream());
        container.begin_update();
        container.put_entry("logs/", MemoryFile::new()).unwrap();
        container.commit_update().unwrap();
        assert!(container.entry("logs/").unwrap().is_dir());

        container.begin_update();
        container
            .put_entry("a.txt", MemoryFile::from_bytes(b"alpha".to_vec()))
            .unwrap();
        container.commit_update().unwrap();
        assert!(container.entry("logs/").is_some());
        assert!(container.entry("a.txt").is_some());
    }

    #[test]
    fn remove_unknown_entry_fails() {
        let mut container = ZipContainer::create(MemoryFile::new().stream());
        container.begin_update();
        assert!(matches!(
            container.remove_entry("ghost.txt"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn into_inner_releases_a_parseable_archive() {
        let file = MemoryFile::new();
        let mut container = ZipContainer::create(file.stream());
        container.begin_update();
        container
            .put_entry("a.txt", MemoryFile::from_bytes(b"alpha".to_vec()))
            .unwrap();
        container.commit_update().unwrap();
        drop(container.into_inner());

        let mut archive = ZipArchive::new(Cursor::new(file.to_vec())).unwrap();
        let mut entry = archive.by_name("a.txt").unwrap();
        let mut text = String::new();
        entry.read_to_string(&mut text).unwrap();
        assert_eq!(text, "alpha");
    }
}
