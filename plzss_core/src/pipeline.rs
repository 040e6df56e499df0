//! Whole-file compress and decompress: segment, dispatch a batch, frame,
//! repeat.
//!
//! At most `Config::max_batch_blocks` blocks are in memory at a time, in raw
//! and in encoded form.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::{dispatch_decode, dispatch_encode, Dispatcher, SequentialDispatcher};
use crate::error::{LzssError, Result};
use crate::reader::Reader;
use crate::segment::BlockReader;
use crate::writer::Writer;

#[derive(Debug, Clone)]
pub struct CompressSummary {
    pub blocks: u32,
    pub raw_size: u64,
    /// Container size including header and record prefixes.
    pub compressed_size: u64,
    pub backend: &'static str,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct DecompressSummary {
    pub blocks: u32,
    pub raw_size: u64,
    pub backend: &'static str,
    pub elapsed: Duration,
}

/// Pick the backend for an input of `size` bytes, if known.
fn select_backend(
    parallel: &Arc<dyn Dispatcher>,
    size: Option<u64>,
    config: &Config,
) -> Arc<dyn Dispatcher> {
    match size {
        Some(size) if size < config.parallel_threshold => {
            warn!(
                size,
                threshold = config.parallel_threshold,
                "input below parallel threshold, using the sequential path"
            );
            Arc::new(SequentialDispatcher)
        }
        _ => Arc::clone(parallel),
    }
}

/// Compress everything `input` yields into a PLZ1 container on `output`.
///
/// `size_hint` is the input length when known up front (a regular file);
/// without it the parallel-threshold decision waits for the first batch.
pub fn compress_stream<R: Read, W: Write + Seek>(
    input: R,
    size_hint: Option<u64>,
    output: W,
    config: &Config,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<CompressSummary> {
    config.validate()?;
    let t0 = Instant::now();

    let mut blocks = BlockReader::new(input, config.block_size);
    let mut writer = Writer::new(output, config.block_size, config.checksums)?;

    let mut batch = blocks.next_batch(config.max_batch_blocks)?;
    let known_size = size_hint.or_else(|| blocks.is_eof().then(|| blocks.bytes_read()));
    let backend = select_backend(&dispatcher, known_size, config);

    while !batch.is_empty() {
        let encoded = dispatch_encode(&backend, batch, config.dispatch_timeout)?;
        writer.write_batch(&encoded)?;
        batch = blocks.next_batch(config.max_batch_blocks)?;
    }

    let compressed_size = writer.bytes_written();
    let header = writer.finish()?;
    let summary = CompressSummary {
        blocks: header.block_count,
        raw_size: header.raw_size,
        compressed_size,
        backend: backend.name(),
        elapsed: t0.elapsed(),
    };
    info!(
        blocks = summary.blocks,
        raw_size = summary.raw_size,
        compressed_size = summary.compressed_size,
        backend = summary.backend,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "compressed"
    );
    Ok(summary)
}

/// Decode a PLZ1 container from `input`, writing the raw bytes to `output`
/// in block order.
pub fn decompress_stream<R: Read, W: Write>(
    input: R,
    mut output: W,
    config: &Config,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<DecompressSummary> {
    config.validate()?;
    let t0 = Instant::now();

    let mut reader = Reader::open(input)?;
    let backend = select_backend(&dispatcher, Some(reader.raw_size()), config);
    let raw_capacity = reader.block_size() as usize;

    loop {
        let batch = reader.read_batch(config.max_batch_blocks)?;
        if batch.is_empty() {
            break;
        }
        let decoded = dispatch_decode(&backend, batch, raw_capacity, config.dispatch_timeout)?;
        for block in &decoded {
            output.write_all(block.as_bytes())?;
        }
    }

    let blocks = reader.blocks_read();
    let raw_size = reader.raw_size();
    reader.finish()?;
    output.flush()?;

    let summary = DecompressSummary {
        blocks,
        raw_size,
        backend: backend.name(),
        elapsed: t0.elapsed(),
    };
    info!(
        blocks = summary.blocks,
        raw_size = summary.raw_size,
        backend = summary.backend,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "decompressed"
    );
    Ok(summary)
}

/// In-memory [`compress_stream`].
pub fn compress(data: &[u8], config: &Config, dispatcher: Arc<dyn Dispatcher>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    compress_stream(
        data,
        Some(data.len() as u64),
        Cursor::new(&mut out),
        config,
        dispatcher,
    )?;
    Ok(out)
}

/// In-memory [`decompress_stream`].
pub fn decompress(data: &[u8], config: &Config, dispatcher: Arc<dyn Dispatcher>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decompress_stream(data, &mut out, config, dispatcher)?;
    Ok(out)
}

/// Compress the file at `input` into a new PLZ1 file at `output`.
///
/// The container is staged next to `output` and only moved into place once
/// it is complete; on error `output` is left untouched.
pub fn compress_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &Config,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<CompressSummary> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let src = File::open(input).map_err(|e| LzssError::from(e).with_path(input))?;
    let size = src
        .metadata()
        .map_err(|e| LzssError::from(e).with_path(input))?
        .len();
    let mut staged = staging_file(output)?;
    let summary = compress_stream(
        AtPath::new(BufReader::new(src), input),
        Some(size),
        AtPath::new(BufWriter::new(staged.as_file_mut()), output),
        config,
        dispatcher,
    )?;
    persist(staged, output)?;
    Ok(summary)
}

/// Decompress the PLZ1 file at `input` into a new file at `output`.
///
/// Decoded bytes are staged next to `output`; a container that fails its
/// end-of-file checks leaves no partial output behind.
pub fn decompress_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &Config,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<DecompressSummary> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let src = File::open(input).map_err(|e| LzssError::from(e).with_path(input))?;
    let mut staged = staging_file(output)?;
    let summary = decompress_stream(
        AtPath::new(BufReader::new(src), input),
        AtPath::new(BufWriter::new(staged.as_file_mut()), output),
        config,
        dispatcher,
    )?;
    persist(staged, output)?;
    Ok(summary)
}

/// Temporary file in the directory `output` will live in, so the final
/// rename stays on one filesystem. Removed on drop unless persisted.
fn staging_file(output: &Path) -> Result<NamedTempFile> {
    let dir = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    NamedTempFile::new_in(dir).map_err(|e| LzssError::from(e).with_path(dir))
}

fn persist(staged: NamedTempFile, output: &Path) -> Result<()> {
    staged
        .persist(output)
        .map(drop)
        .map_err(|e| LzssError::from(e.error).with_path(output))
}

/// Prefixes every I/O error from the wrapped stream with its file path.
struct AtPath<T> {
    inner: T,
    path: PathBuf,
}

impl<T> AtPath<T> {
    fn new(inner: T, path: &Path) -> Self {
        Self {
            inner,
            path: path.to_path_buf(),
        }
    }

    fn label(&self, e: io::Error) -> io::Error {
        io::Error::new(e.kind(), format!("{}: {}", self.path.display(), e))
    }
}

impl<T: Read> Read for AtPath<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).map_err(|e| self.label(e))
    }
}

impl<T: Write> Write for AtPath<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).map_err(|e| self.label(e))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().map_err(|e| self.label(e))
    }
}

impl<T: Seek> Seek for AtPath<T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos).map_err(|e| self.label(e))
    }
}
