//! Seek emulation over forward-only streams.
//!
//! Archive engines hand out entry content as forward-only streams: a
//! deflate decoder cannot jump backward, and a pending data sink only
//! appends. [`SeekStream`] makes such a stream fully seekable by
//! mirroring every byte that passes through it in a [`ShadowBuffer`]
//! and serving repositioned reads from the mirror. Writes land in the
//! mirror first and the whole mirror is then replayed to the
//! underlying sink, so the sink always holds the complete current
//! content.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use zipfs_core::{Error, Result, VfsStream};

/// Bounded transfer unit for fast-forward and replay loops.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Growable byte region indexed by absolute offset.
///
/// The length is the high-water mark of all bytes ever stored and
/// never shrinks. Reads past the end come back short, never as errors.
#[derive(Debug, Default)]
pub struct ShadowBuffer {
    data: Vec<u8>,
}

impl ShadowBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length in bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whether no bytes have been stored yet.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copies up to `buf.len()` bytes starting at `offset` into `buf`
    /// and returns the count copied. Returns 0 at or past the end.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        if offset >= self.data.len() as u64 {
            return 0;
        }
        let start = offset as usize;
        let count = buf.len().min(self.data.len() - start);
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        count
    }

    /// Stores `bytes` at `offset`, zero-filling any gap between the
    /// current end and `offset` and extending the buffer as needed.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) {
        let start = offset as usize;
        let end = start + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(bytes);
    }
}

/// A seekable view over a forward-only stream.
///
/// Reads fast-forward the underlying source into the shadow buffer in
/// bounded chunks and are then served from the buffer. Writes store at
/// the current position, replay the entire buffer to the underlying
/// sink, and fire the write-completion hook exactly once. Changing the
/// length is not supported in any state.
pub struct SeekStream<S> {
    base: S,
    shadow: ShadowBuffer,
    position: u64,
    chunk: Vec<u8>,
    on_data_written: Option<Box<dyn FnMut() -> Result<()> + Send>>,
}

impl<S: Read + Write + Seek> SeekStream<S> {
    /// Wraps `base` with the default chunk size.
    pub fn new(base: S) -> Self {
        Self::with_chunk_size(base, DEFAULT_CHUNK_SIZE)
    }

    /// Wraps `base`, transferring at most `chunk_size` bytes per step
    /// while fast-forwarding or replaying.
    pub fn with_chunk_size(base: S, chunk_size: usize) -> Self {
        SeekStream {
            base,
            shadow: ShadowBuffer::new(),
            position: 0,
            chunk: vec![0; chunk_size.max(1)],
            on_data_written: None,
        }
    }

    /// Installs a hook fired once after each completed write call.
    ///
    /// A hook error surfaces out of the triggering `write`.
    pub fn on_data_written<F>(&mut self, hook: F)
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.on_data_written = Some(Box::new(hook));
    }

    /// Current logical position.
    ///
    /// May point past the buffered length after a far seek.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Pulls from the source until the shadow buffer covers `target`
    /// bytes, or with `None` until the source is exhausted.
    fn fast_forward(&mut self, target: Option<u64>) -> io::Result<()> {
        while target.map_or(true, |t| t > self.shadow.len()) {
            if self.read_chunk()? == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Reads up to one chunk from the source and appends it at the
    /// shadow buffer's high-water mark. Partial reads are re-polled
    /// until the chunk fills or the source reports end.
    fn read_chunk(&mut self) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.chunk.len() {
            let count = self.base.read(&mut self.chunk[filled..])?;
            if count == 0 {
                break;
            }
            filled += count;
        }
        let end = self.shadow.len();
        self.shadow.write_at(end, &self.chunk[..filled]);
        Ok(filled)
    }

    /// Replays the whole shadow buffer to the sink in chunks,
    /// restoring the sink cursor afterwards.
    fn replay_to_base(&mut self) -> io::Result<()> {
        let prior = self.base.stream_position()?;
        self.base.seek(SeekFrom::Start(0))?;
        let mut offset = 0u64;
        while offset < self.shadow.len() {
            let count = self.shadow.read_at(offset, &mut self.chunk);
            self.base.write_all(&self.chunk[..count])?;
            offset += count as u64;
        }
        self.base.seek(SeekFrom::Start(prior))?;
        Ok(())
    }
}

impl<S: Read + Write + Seek> Read for SeekStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let target = self.position.saturating_add(buf.len() as u64);
        self.fast_forward(Some(target))?;
        let count = self.shadow.read_at(self.position, buf);
        self.position += count as u64;
        Ok(count)
    }
}

impl<S: Read + Write + Seek> Write for SeekStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.shadow.write_at(self.position, buf);
        self.position += buf.len() as u64;
        self.replay_to_base()?;
        if let Some(hook) = self.on_data_written.as_mut() {
            hook().map_err(io::Error::other)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.base.flush()
    }
}

impl<S: Read + Write + Seek> Seek for SeekStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => {
                self.fast_forward(None)?;
                self.shadow.len() as i128 + delta as i128
            }
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        let target = target as u64;
        self.fast_forward(Some(target))?;
        self.position = target;
        Ok(target)
    }
}

impl<S: Read + Write + Seek + Send> VfsStream for SeekStream<S> {
    fn len(&self) -> u64 {
        self.shadow.len()
    }

    fn set_len(&mut self, _size: u64) -> Result<()> {
        Err(Error::Unsupported("changing the length of an entry stream"))
    }
}

impl<S> fmt::Debug for SeekStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeekStream")
            .field("position", &self.position)
            .field("buffered", &self.shadow.len())
            .finish_non_exhaustive()
    }
}
