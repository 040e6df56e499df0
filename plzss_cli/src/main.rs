use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

use plzss_core::format::{
    RecordInfo, DEFAULT_BLOCK_SIZE, DEFAULT_PARALLEL_THRESHOLD, FLAG_HAS_CHECKSUM,
};
use plzss_core::{
    compress_file, compress_stream, decompress_file, decompress_stream, CompressSummary, Config,
    DecompressSummary, Dispatcher, Reader,
};
use plzss_dispatch::dispatcher_by_name;

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "plzss",
    about = "Parallel block LZSS: compress, decompress, and inspect PLZ1 files",
    version
)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DispatchArgs {
    /// Parallel backend: threads | sequential | opencl
    #[arg(long, default_value = "threads")]
    backend: String,
    /// Worker threads for the threads backend (default: one per CPU)
    #[arg(long)]
    threads: Option<usize>,
    /// Blocks per dispatched batch
    #[arg(long, default_value_t = 16)]
    batch_blocks: usize,
    /// Fail a batch that takes longer than this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into PLZ1 format
    Compress {
        /// Source file to compress ("-" reads stdin)
        input: PathBuf,
        /// Destination PLZ1 file
        output: PathBuf,
        /// Raw bytes per block (default: 1048576 = 1 MiB)
        #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: u32,
        /// Inputs smaller than this many bytes run sequentially
        #[arg(long, default_value_t = DEFAULT_PARALLEL_THRESHOLD)]
        threshold: u64,
        /// Do not store per-block checksums
        #[arg(long)]
        no_checksum: bool,
        #[command(flatten)]
        dispatch: DispatchArgs,
    },
    /// Decompress a PLZ1 file back to raw bytes
    Decompress {
        /// Source PLZ1 file ("-" reads stdin)
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
        #[command(flatten)]
        dispatch: DispatchArgs,
    },
    /// Print header metadata and block record statistics
    Inspect {
        /// PLZ1 file to inspect
        file: PathBuf,
        /// Print per-block details
        #[arg(long)]
        blocks: bool,
        /// Print the report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn is_stdio(path: &Path) -> bool {
    path.to_str() == Some("-")
}

/// Temporary file beside `output`; persisted over it only on success.
fn stage_output(output: &Path) -> anyhow::Result<NamedTempFile> {
    let dir = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    NamedTempFile::new_in(dir).with_context(|| format!("creating output file {:?}", output))
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn throughput(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return "-".into();
    }
    format!("{}/s", human_bytes((bytes as f64 / secs) as u64))
}

impl DispatchArgs {
    fn dispatcher(&self) -> anyhow::Result<Arc<dyn Dispatcher>> {
        dispatcher_by_name(&self.backend, self.threads)
            .with_context(|| format!("setting up the {} backend", self.backend))
    }

    fn apply(&self, config: &mut Config) {
        config.max_batch_blocks = self.batch_blocks;
        config.dispatch_timeout = self.timeout_secs.map(Duration::from_secs);
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    input: PathBuf,
    output: PathBuf,
    block_size: u32,
    threshold: u64,
    no_checksum: bool,
    dispatch: DispatchArgs,
) -> anyhow::Result<()> {
    if is_stdio(&output) {
        anyhow::bail!("compress needs a seekable output file, not stdout");
    }
    let mut config = Config {
        block_size,
        parallel_threshold: threshold,
        checksums: !no_checksum,
        ..Config::default()
    };
    dispatch.apply(&mut config);
    let dispatcher = dispatch.dispatcher()?;

    let summary: CompressSummary = if is_stdio(&input) {
        let mut staged = stage_output(&output)?;
        let summary = compress_stream(
            io::stdin().lock(),
            None,
            BufWriter::new(staged.as_file_mut()),
            &config,
            dispatcher,
        )
        .with_context(|| format!("compressing stdin into {:?}", output))?;
        staged
            .persist(&output)
            .with_context(|| format!("writing {:?}", output))?;
        summary
    } else {
        compress_file(&input, &output, &config, dispatcher)
            .with_context(|| format!("compressing {:?} into {:?}", input, output))?
    };

    let ratio = if summary.compressed_size == 0 {
        0.0
    } else {
        summary.raw_size as f64 / summary.compressed_size as f64
    };
    eprintln!("  backend     : {}", summary.backend);
    eprintln!("  block size  : {}", human_bytes(block_size as u64));
    eprintln!("  blocks      : {}", summary.blocks);
    eprintln!("  raw size    : {}", human_bytes(summary.raw_size));
    eprintln!("  compressed  : {}", human_bytes(summary.compressed_size));
    eprintln!("  ratio       : {:.2}x", ratio);
    eprintln!("  throughput  : {}", throughput(summary.raw_size, summary.elapsed));
    eprintln!("  elapsed     : {:.3}s", summary.elapsed.as_secs_f64());
    Ok(())
}

fn run_decompress(input: PathBuf, output: PathBuf, dispatch: DispatchArgs) -> anyhow::Result<()> {
    let mut config = Config::default();
    dispatch.apply(&mut config);
    let dispatcher = dispatch.dispatcher()?;

    let summary: DecompressSummary = if !is_stdio(&input) && !is_stdio(&output) {
        decompress_file(&input, &output, &config, dispatcher)
            .with_context(|| format!("decompressing {:?} into {:?}", input, output))?
    } else {
        let src: Box<dyn Read> = if is_stdio(&input) {
            Box::new(io::stdin().lock())
        } else {
            Box::new(BufReader::new(
                File::open(&input).with_context(|| format!("opening input file {:?}", input))?,
            ))
        };
        if is_stdio(&output) {
            let dst = BufWriter::new(io::stdout().lock());
            decompress_stream(src, dst, &config, dispatcher)
                .with_context(|| format!("decompressing {:?}", input))?
        } else {
            let mut staged = stage_output(&output)?;
            let summary =
                decompress_stream(src, BufWriter::new(staged.as_file_mut()), &config, dispatcher)
                    .with_context(|| format!("decompressing {:?}", input))?;
            staged
                .persist(&output)
                .with_context(|| format!("writing {:?}", output))?;
            summary
        }
    };

    eprintln!("  backend     : {}", summary.backend);
    eprintln!("  blocks      : {}", summary.blocks);
    eprintln!("  raw size    : {}", human_bytes(summary.raw_size));
    eprintln!("  throughput  : {}", throughput(summary.raw_size, summary.elapsed));
    eprintln!("  elapsed     : {:.3}s", summary.elapsed.as_secs_f64());
    Ok(())
}

#[derive(Serialize)]
struct InspectReport {
    file: String,
    version: u16,
    flags: u16,
    checksums: bool,
    block_size: u32,
    block_count: u32,
    raw_size: u64,
    file_size: u64,
    ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocks: Option<Vec<BlockReport>>,
}

#[derive(Serialize)]
struct BlockReport {
    id: u32,
    offset: u64,
    raw_len: u32,
    encoded_len: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

impl BlockReport {
    fn new(info: &RecordInfo, checksums: bool) -> Self {
        Self {
            id: info.id,
            offset: info.offset,
            raw_len: info.raw_len,
            encoded_len: info.encoded_len,
            checksum: checksums.then(|| format!("{:016x}", info.checksum)),
        }
    }
}

fn run_inspect(file: PathBuf, show_blocks: bool, json: bool) -> anyhow::Result<()> {
    let f = File::open(&file).with_context(|| format!("opening {:?}", file))?;
    let file_size = f.metadata()?.len();
    let reader = Reader::open(BufReader::new(f)).with_context(|| format!("reading {:?}", file))?;
    let header = reader.header.clone();
    // Walks every record, so a damaged container fails here.
    let records = reader
        .scan()
        .with_context(|| format!("scanning records of {:?}", file))?;

    let checksums = header.has_flag(FLAG_HAS_CHECKSUM);
    let report = InspectReport {
        file: file.display().to_string(),
        version: header.version,
        flags: header.flags,
        checksums,
        block_size: header.block_size,
        block_count: header.block_count,
        raw_size: header.raw_size,
        file_size,
        ratio: if file_size == 0 {
            0.0
        } else {
            header.raw_size as f64 / file_size as f64
        },
        blocks: show_blocks.then(|| {
            records
                .iter()
                .map(|r| BlockReport::new(r, checksums))
                .collect()
        }),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("=== PLZ1 File: {:?} ===", file);
    println!();
    println!("  format version : {}", report.version);
    println!("  block size     : {}", human_bytes(report.block_size as u64));
    println!("  block count    : {}", report.block_count);
    println!("  raw size       : {}", human_bytes(report.raw_size));
    println!("  file on disk   : {}", human_bytes(report.file_size));
    println!("  ratio          : {:.2}x", report.ratio);
    println!("  flags          : 0x{:04x}", report.flags);
    println!("  checksums      : {}", if checksums { "xxh3-64" } else { "none" });

    if let Some(blocks) = &report.blocks {
        println!();
        println!(
            "  {:>8}  {:>14}  {:>12}  {:>12}  {:>16}",
            "block", "file offset", "encoded", "raw", "checksum"
        );
        println!("  {}", "-".repeat(70));
        for b in blocks {
            println!(
                "  {:>8}  {:>14}  {:>12}  {:>12}  {:>16}",
                b.id,
                b.offset,
                human_bytes(b.encoded_len as u64),
                human_bytes(b.raw_len as u64),
                b.checksum.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Compress {
            input,
            output,
            block_size,
            threshold,
            no_checksum,
            dispatch,
        } => run_compress(input, output, block_size, threshold, no_checksum, dispatch),
        Commands::Decompress {
            input,
            output,
            dispatch,
        } => run_decompress(input, output, dispatch),
        Commands::Inspect { file, blocks, json } => run_inspect(file, blocks, json),
    }
}
