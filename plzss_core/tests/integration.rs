/// Integration tests: whole-container round trips through every backend,
/// plus the failure modes a damaged or truncated PLZ1 file must produce.
///
/// Containers are built with small block sizes so that multi-block and
/// multi-batch paths run in milliseconds.
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use plzss_core::format::{
    RecordHeader, FLAG_HAS_CHECKSUM, FORMAT_VERSION, HEADER_SIZE, MAX_BLOCK_SIZE,
    RECORD_HEADER_SIZE,
};
use plzss_core::{
    compress, compress_file, decompress, decompress_file, Config, DispatchStage, Dispatcher,
    EncodedBlock, LzssError, Plz1Header, RawBlock, Reader, SequentialDispatcher,
};
use plzss_dispatch::ThreadPoolDispatcher;
use proptest::prelude::*;

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Generate `len` highly compressible bytes (repeating pattern).
fn compressible_bytes(len: usize) -> Vec<u8> {
    let pattern = b"the quick brown fox jumps over the lazy dog. ";
    (0..len).map(|i| pattern[i % pattern.len()]).collect()
}

/// Text-like input: repeated phrases broken up by noise.
fn mixed_bytes(len: usize) -> Vec<u8> {
    let noise = pseudo_random_bytes(len, 0xC0FFEE);
    compressible_bytes(len)
        .into_iter()
        .zip(noise)
        .enumerate()
        .map(|(i, (text, noise))| if i % 97 < 11 { noise } else { text })
        .collect()
}

// ── helpers ───────────────────────────────────────────────────────────────

/// Small blocks, parallel path always taken.
fn small_config(block_size: u32) -> Config {
    Config {
        block_size,
        parallel_threshold: 0,
        max_batch_blocks: 3,
        ..Config::default()
    }
}

fn threads() -> Arc<dyn Dispatcher> {
    Arc::new(ThreadPoolDispatcher::new(Some(4)).unwrap())
}

fn sequential() -> Arc<dyn Dispatcher> {
    Arc::new(SequentialDispatcher)
}

/// Hands results back in reverse id order.
struct ReversingDispatcher;

impl Dispatcher for ReversingDispatcher {
    fn name(&self) -> &'static str {
        "reversing"
    }

    fn encode_batch(&self, blocks: Vec<RawBlock>) -> plzss_core::Result<Vec<EncodedBlock>> {
        let mut out = SequentialDispatcher.encode_batch(blocks)?;
        out.reverse();
        Ok(out)
    }

    fn decode_batch(
        &self,
        blocks: Vec<EncodedBlock>,
        raw_capacity: usize,
    ) -> plzss_core::Result<Vec<RawBlock>> {
        let mut out = SequentialDispatcher.decode_batch(blocks, raw_capacity)?;
        out.reverse();
        Ok(out)
    }
}

/// Fails every batch; proves a code path never reached the parallel backend.
struct RefusingDispatcher;

impl Dispatcher for RefusingDispatcher {
    fn name(&self) -> &'static str {
        "refusing"
    }

    fn encode_batch(&self, _: Vec<RawBlock>) -> plzss_core::Result<Vec<EncodedBlock>> {
        Err(LzssError::dispatch(DispatchStage::Execute, "parallel backend used"))
    }

    fn decode_batch(&self, _: Vec<EncodedBlock>, _: usize) -> plzss_core::Result<Vec<RawBlock>> {
        Err(LzssError::dispatch(DispatchStage::Execute, "parallel backend used"))
    }
}

/// Takes far longer than any test timeout.
struct StalledDispatcher;

impl Dispatcher for StalledDispatcher {
    fn name(&self) -> &'static str {
        "stalled"
    }

    fn encode_batch(&self, blocks: Vec<RawBlock>) -> plzss_core::Result<Vec<EncodedBlock>> {
        thread::sleep(Duration::from_secs(2));
        SequentialDispatcher.encode_batch(blocks)
    }

    fn decode_batch(
        &self,
        blocks: Vec<EncodedBlock>,
        raw_capacity: usize,
    ) -> plzss_core::Result<Vec<RawBlock>> {
        thread::sleep(Duration::from_secs(2));
        SequentialDispatcher.decode_batch(blocks, raw_capacity)
    }
}

/// Loses the last block of every batch.
struct LossyDispatcher;

impl Dispatcher for LossyDispatcher {
    fn name(&self) -> &'static str {
        "lossy"
    }

    fn encode_batch(&self, blocks: Vec<RawBlock>) -> plzss_core::Result<Vec<EncodedBlock>> {
        let mut out = SequentialDispatcher.encode_batch(blocks)?;
        out.pop();
        Ok(out)
    }

    fn decode_batch(
        &self,
        blocks: Vec<EncodedBlock>,
        raw_capacity: usize,
    ) -> plzss_core::Result<Vec<RawBlock>> {
        SequentialDispatcher.decode_batch(blocks, raw_capacity)
    }
}

fn header_of(container: &[u8]) -> Plz1Header {
    let bytes: [u8; HEADER_SIZE as usize] = container[..HEADER_SIZE as usize].try_into().unwrap();
    Plz1Header::from_bytes(&bytes).unwrap()
}

fn set_block_count(container: &mut [u8], count: u32) {
    container[14..18].copy_from_slice(&count.to_le_bytes());
}

// ── round trips ───────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_threads_multi_batch() {
    let data = mixed_bytes(10 * 4096 + 123);
    let config = small_config(4096);

    let packed = compress(&data, &config, threads()).unwrap();
    let header = header_of(&packed);
    assert_eq!(header.block_count, 11);
    assert_eq!(header.raw_size, data.len() as u64);
    assert!(header.has_flag(FLAG_HAS_CHECKSUM));
    assert!(packed.len() < data.len(), "mixed text should shrink");

    assert_eq!(decompress(&packed, &config, threads()).unwrap(), data);
}

#[test]
fn test_backends_produce_identical_containers() {
    let data = mixed_bytes(7 * 1000 + 1);
    let config = small_config(1000);

    let reference = compress(&data, &config, sequential()).unwrap();
    let parallel = compress(&data, &config, threads()).unwrap();
    let reversed = compress(&data, &config, Arc::new(ReversingDispatcher)).unwrap();
    assert_eq!(parallel, reference);
    assert_eq!(reversed, reference);

    assert_eq!(
        decompress(&reference, &config, Arc::new(ReversingDispatcher)).unwrap(),
        data
    );
}

#[test]
fn test_block_boundary_sizes() {
    let block = 512usize;
    let config = small_config(block as u32);
    for (len, blocks) in [
        (0, 0),
        (1, 1),
        (block - 1, 1),
        (block, 1),
        (block + 1, 2),
        (3 * block, 3),
    ] {
        let data = pseudo_random_bytes(len, len as u64 + 1);
        let packed = compress(&data, &config, threads()).unwrap();
        assert_eq!(header_of(&packed).block_count, blocks, "input of {len} bytes");
        assert_eq!(decompress(&packed, &config, threads()).unwrap(), data);
    }
}

#[test]
fn test_empty_input_is_header_only() {
    let packed = compress(&[], &Config::default(), threads()).unwrap();
    assert_eq!(packed.len(), HEADER_SIZE as usize);
    assert!(decompress(&packed, &Config::default(), threads())
        .unwrap()
        .is_empty());
}

#[test]
fn test_two_mib_of_one_byte_gives_two_small_blocks() {
    let data = vec![b'A'; 2 * 1024 * 1024];
    let config = Config::default();

    let packed = compress(&data, &config, threads()).unwrap();
    let infos = Reader::open(packed.as_slice()).unwrap().scan().unwrap();
    assert_eq!(infos.len(), 2);
    for info in &infos {
        assert_eq!(info.raw_len, 1024 * 1024);
        // 18-byte matches at 17 bits each.
        assert!(info.encoded_len < 130 * 1024, "block {} is {} bytes", info.id, info.encoded_len);
    }
    assert_eq!(decompress(&packed, &config, threads()).unwrap(), data);
}

#[test]
fn test_without_checksums() {
    let data = mixed_bytes(5000);
    let config = Config {
        checksums: false,
        ..small_config(1024)
    };
    let packed = compress(&data, &config, threads()).unwrap();
    assert!(!header_of(&packed).has_flag(FLAG_HAS_CHECKSUM));
    assert_eq!(decompress(&packed, &config, threads()).unwrap(), data);
}

// ── threshold ─────────────────────────────────────────────────────────────

#[test]
fn test_small_input_takes_sequential_path() {
    let data = compressible_bytes(10_000);
    let config = Config {
        block_size: 4096,
        ..Config::default()
    };

    let packed = compress(&data, &config, Arc::new(RefusingDispatcher)).unwrap();
    assert_eq!(header_of(&packed).block_count, 3);
    assert_eq!(
        decompress(&packed, &config, Arc::new(RefusingDispatcher)).unwrap(),
        data
    );

    // Same container as a parallel run.
    assert_eq!(packed, compress(&data, &small_config(4096), threads()).unwrap());
}

#[test]
fn test_large_input_uses_parallel_backend() {
    let data = compressible_bytes(10_000);
    let config = Config {
        parallel_threshold: 10_000,
        ..small_config(4096)
    };
    let err = compress(&data, &config, Arc::new(RefusingDispatcher)).unwrap_err();
    assert!(matches!(
        err,
        LzssError::Dispatch {
            stage: DispatchStage::Execute,
            ..
        }
    ));
}

// ── dispatch failures ─────────────────────────────────────────────────────

#[test]
fn test_stalled_backend_times_out() {
    let config = Config {
        dispatch_timeout: Some(Duration::from_millis(50)),
        ..small_config(1024)
    };
    let err = compress(&[7u8; 3000], &config, Arc::new(StalledDispatcher)).unwrap_err();
    match err {
        LzssError::DispatchTimeout { blocks, timeout } => {
            assert_eq!(blocks, 3);
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("expected a timeout, got {other}"),
    }
}

#[test]
fn test_timeout_is_not_hit_by_a_healthy_backend() {
    let data = mixed_bytes(20_000);
    let config = Config {
        dispatch_timeout: Some(Duration::from_secs(30)),
        ..small_config(2048)
    };
    let packed = compress(&data, &config, threads()).unwrap();
    assert_eq!(decompress(&packed, &config, threads()).unwrap(), data);
}

#[test]
fn test_missing_result_is_a_sync_error() {
    let err = compress(&[1u8; 5000], &small_config(1024), Arc::new(LossyDispatcher)).unwrap_err();
    assert!(matches!(
        err,
        LzssError::Dispatch {
            stage: DispatchStage::Sync,
            ..
        }
    ));
    assert!(err.to_string().contains("sync"));
}

// ── damaged containers ────────────────────────────────────────────────────

#[test]
fn test_block_count_off_by_one_is_a_framing_error() {
    let data = compressible_bytes(4000);
    let config = small_config(1000);
    let packed = compress(&data, &config, threads()).unwrap();

    let mut too_many = packed.clone();
    set_block_count(&mut too_many, 5);
    let err = decompress(&too_many, &config, threads()).unwrap_err();
    assert!(matches!(err, LzssError::Framing(_)), "got {err}");
    assert!(err.to_string().contains("only 4 records"));

    let mut too_few = packed.clone();
    set_block_count(&mut too_few, 3);
    let err = decompress(&too_few, &config, threads()).unwrap_err();
    assert!(matches!(err, LzssError::Framing(_)), "got {err}");
}

#[test]
fn test_truncated_container_is_a_framing_error() {
    let data = mixed_bytes(3000);
    let config = small_config(1000);
    let packed = compress(&data, &config, threads()).unwrap();

    for cut in [10, HEADER_SIZE as usize + 3, packed.len() - 1] {
        let err = decompress(&packed[..cut], &config, threads()).unwrap_err();
        assert!(matches!(err, LzssError::Framing(_)), "cut at {cut}: {err}");
    }
}

#[test]
fn test_payload_corruption_fails_checksum() {
    let data = mixed_bytes(3000);
    let config = small_config(1000);
    let mut packed = compress(&data, &config, threads()).unwrap();

    // First payload byte of block 0.
    let payload = HEADER_SIZE as usize + RECORD_HEADER_SIZE as usize + 8;
    packed[payload] ^= 0x55;
    let err = decompress(&packed, &config, threads()).unwrap_err();
    assert!(matches!(err, LzssError::ChecksumMismatch { block: 0, .. }), "got {err}");
}

/// One record of 100 distinct bytes: all literals, 900 bits in 113 bytes.
fn literal_container() -> Vec<u8> {
    let data: Vec<u8> = (100..200).collect();
    let config = Config {
        checksums: false,
        ..small_config(1024)
    };
    let packed = compress(&data, &config, sequential()).unwrap();
    let encoded_len = u32::from_le_bytes(packed[36..40].try_into().unwrap());
    assert_eq!(encoded_len, 113);
    packed
}

#[test]
fn test_short_payload_is_a_truncated_stream() {
    let mut packed = literal_container();
    // 111 bytes = 888 bits: 98 literals and 6 stray bits.
    packed[36..40].copy_from_slice(&111u32.to_le_bytes());
    packed.truncate(40 + 111);

    let err = decompress(&packed, &Config::default(), sequential()).unwrap_err();
    match err {
        LzssError::TruncatedStream {
            block,
            needed_bits,
            remaining_bits,
        } => {
            assert_eq!(block, 0);
            assert_eq!(needed_bits, 9);
            assert_eq!(remaining_bits, 6);
        }
        other => panic!("expected a truncated stream, got {other}"),
    }
}

#[test]
fn test_oversized_record_lengths_are_rejected() {
    let mut raw_too_big = literal_container();
    raw_too_big[32..36].copy_from_slice(&1025u32.to_le_bytes());
    let err = decompress(&raw_too_big, &Config::default(), sequential()).unwrap_err();
    assert!(
        matches!(
            err,
            LzssError::CapacityExceeded {
                block: 0,
                needed: 1025,
                capacity: 1024
            }
        ),
        "got {err}"
    );

    let mut encoded_too_big = literal_container();
    encoded_too_big[36..40].copy_from_slice(&u32::MAX.to_le_bytes());
    let err = decompress(&encoded_too_big, &Config::default(), sequential()).unwrap_err();
    assert!(matches!(err, LzssError::CapacityExceeded { .. }), "got {err}");
}

#[test]
fn test_declared_payload_length_is_not_preallocated() {
    // A 5-byte payload claiming to be 64 MiB long.
    let header = Plz1Header {
        version: FORMAT_VERSION,
        flags: 0,
        block_size: MAX_BLOCK_SIZE,
        block_count: 1,
        raw_size: 10,
    };
    let record = RecordHeader {
        raw_len: 10,
        encoded_len: MAX_BLOCK_SIZE,
    };
    let mut container = header.to_bytes().to_vec();
    container.extend_from_slice(&record.to_bytes());
    container.extend_from_slice(&[0u8; 5]);

    let mut reader = Reader::open(&container[..]).unwrap();
    let err = reader.read_block().unwrap_err();
    assert!(matches!(err, LzssError::Framing(_)), "got {err}");
    assert!(err.to_string().contains("record 0 is cut short"));
}

#[test]
fn test_block_size_beyond_the_maximum_is_a_framing_error() {
    let data = compressible_bytes(4000);
    let mut packed = compress(&data, &small_config(1000), sequential()).unwrap();
    packed[10..14].copy_from_slice(&u32::MAX.to_le_bytes());
    let err = decompress(&packed, &Config::default(), sequential()).unwrap_err();
    assert!(matches!(err, LzssError::Framing(_)), "got {err}");
    assert!(err.to_string().contains("exceeds"));
}

// ── files ─────────────────────────────────────────────────────────────────

#[test]
fn test_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("input.bin");
    let packed = dir.path().join("input.bin.plz");
    let restored = dir.path().join("restored.bin");

    let data = mixed_bytes(50_000);
    std::fs::write(&raw, &data).unwrap();
    let config = small_config(8192);

    let summary = compress_file(&raw, &packed, &config, threads()).unwrap();
    assert_eq!(summary.blocks, 7);
    assert_eq!(summary.raw_size, 50_000);
    assert_eq!(summary.backend, "threads");
    assert_eq!(
        summary.compressed_size,
        std::fs::metadata(&packed).unwrap().len()
    );

    let summary = decompress_file(&packed, &restored, &config, threads()).unwrap();
    assert_eq!(summary.blocks, 7);
    assert_eq!(std::fs::read(&restored).unwrap(), data);
}

#[test]
fn test_missing_input_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.bin");
    let err = compress_file(
        &missing,
        dir.path().join("out.plz"),
        &Config::default(),
        threads(),
    )
    .unwrap_err();
    match err {
        LzssError::File { path, source } => {
            assert_eq!(path, missing);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected a file error, got {other}"),
    }
}

fn dir_entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_failed_decompress_leaves_no_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let packed = dir.path().join("data.plz");
    let restored = dir.path().join("data.bin");

    // Several batches decode cleanly before the missing record is noticed.
    let data = mixed_bytes(40_000);
    let config = small_config(1000);
    let mut container = compress(&data, &config, threads()).unwrap();
    let declared = header_of(&container).block_count;
    set_block_count(&mut container, declared + 1);
    std::fs::write(&packed, &container).unwrap();

    let err = decompress_file(&packed, &restored, &config, threads()).unwrap_err();
    assert!(matches!(err, LzssError::Framing(_)), "got {err}");
    assert!(!restored.exists());
    assert_eq!(dir_entries(dir.path()), vec!["data.plz".to_string()]);
}

#[test]
fn test_failed_decompress_keeps_an_existing_output() {
    let dir = tempfile::tempdir().unwrap();
    let packed = dir.path().join("data.plz");
    let restored = dir.path().join("data.bin");
    std::fs::write(&restored, b"previous contents").unwrap();

    let config = small_config(1000);
    let mut container = compress(&compressible_bytes(5000), &config, threads()).unwrap();
    container.truncate(container.len() - 3);
    std::fs::write(&packed, &container).unwrap();

    assert!(decompress_file(&packed, &restored, &config, threads()).is_err());
    assert_eq!(std::fs::read(&restored).unwrap(), b"previous contents");
}

#[test]
fn test_failed_compress_leaves_no_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("input.bin");
    let packed = dir.path().join("input.plz");
    std::fs::write(&raw, compressible_bytes(10_000)).unwrap();

    let err = compress_file(&raw, &packed, &small_config(1000), Arc::new(RefusingDispatcher))
        .unwrap_err();
    assert!(matches!(err, LzssError::Dispatch { .. }), "got {err}");
    assert!(!packed.exists());
    assert_eq!(dir_entries(dir.path()), vec!["input.bin".to_string()]);
}

// ── properties ────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_roundtrip_any_input(
        data in prop::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), any::<u8>()], 0..6000),
        block_size in 3u32..2500,
    ) {
        let config = Config { max_batch_blocks: 4, ..small_config(block_size) };
        let packed = compress(&data, &config, threads()).unwrap();
        prop_assert_eq!(header_of(&packed).raw_size, data.len() as u64);
        prop_assert_eq!(decompress(&packed, &config, threads()).unwrap(), data);
    }
}
