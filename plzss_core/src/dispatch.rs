use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::block::{BlockId, EncodedBlock, RawBlock};
use crate::codec::{decode_block, encode_block};
use crate::error::{DispatchStage, LzssError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Encode,
    Decode,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Encode => "encode",
            Self::Decode => "decode",
        })
    }
}

/// Parallel execution backend for block batches.
///
/// Each implementation:
/// - Runs the block codec over every block of a batch, in any order and on
///   any number of workers, and returns only when the whole batch is done.
/// - Returns exactly one result per input block, carrying the input's id.
///   Results may come back in any order; [`dispatch_encode`] and
///   [`dispatch_decode`] re-sort them.
/// - Names the failing [`DispatchStage`] when the backend itself fails.
pub trait Dispatcher: Send + Sync {
    /// Human-readable backend name for logs and CLI display.
    fn name(&self) -> &'static str;

    fn encode_batch(&self, blocks: Vec<RawBlock>) -> Result<Vec<EncodedBlock>>;

    /// Every output block gets `raw_capacity` bytes of room.
    fn decode_batch(&self, blocks: Vec<EncodedBlock>, raw_capacity: usize)
        -> Result<Vec<RawBlock>>;
}

/// Runs blocks one after another on the calling thread.
///
/// Used for inputs below the parallel threshold and as the reference that
/// every other backend must agree with.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialDispatcher;

impl Dispatcher for SequentialDispatcher {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn encode_batch(&self, blocks: Vec<RawBlock>) -> Result<Vec<EncodedBlock>> {
        blocks.iter().map(encode_block).collect()
    }

    fn decode_batch(
        &self,
        blocks: Vec<EncodedBlock>,
        raw_capacity: usize,
    ) -> Result<Vec<RawBlock>> {
        blocks
            .iter()
            .map(|block| decode_block(block, raw_capacity))
            .collect()
    }
}

/// Encode a batch with one blocking call; results come back in id order.
pub fn dispatch_encode(
    dispatcher: &Arc<dyn Dispatcher>,
    blocks: Vec<RawBlock>,
    timeout: Option<Duration>,
) -> Result<Vec<EncodedBlock>> {
    run_batch(dispatcher, Operation::Encode, blocks, timeout, |d, b| {
        d.encode_batch(b)
    })
}

/// Decode a batch with one blocking call; results come back in id order.
pub fn dispatch_decode(
    dispatcher: &Arc<dyn Dispatcher>,
    blocks: Vec<EncodedBlock>,
    raw_capacity: usize,
    timeout: Option<Duration>,
) -> Result<Vec<RawBlock>> {
    run_batch(dispatcher, Operation::Decode, blocks, timeout, move |d, b| {
        d.decode_batch(b, raw_capacity)
    })
}

fn run_batch<I, O, F>(
    dispatcher: &Arc<dyn Dispatcher>,
    op: Operation,
    blocks: Vec<I>,
    timeout: Option<Duration>,
    call: F,
) -> Result<Vec<O>>
where
    I: BlockId + Send + 'static,
    O: BlockId + Send + 'static,
    F: FnOnce(&dyn Dispatcher, Vec<I>) -> Result<Vec<O>> + Send + 'static,
{
    if blocks.is_empty() {
        return Ok(Vec::new());
    }
    let mut expected: Vec<u32> = blocks.iter().map(BlockId::block_id).collect();
    expected.sort_unstable();
    let count = blocks.len();

    debug!(
        backend = dispatcher.name(),
        %op,
        blocks = count,
        first = expected[0],
        "dispatching batch"
    );
    let t0 = Instant::now();

    let mut results = match timeout {
        None => call(dispatcher.as_ref(), blocks)?,
        Some(limit) => {
            let (tx, rx) = mpsc::channel();
            let worker = Arc::clone(dispatcher);
            thread::Builder::new()
                .name(format!("plzss-{op}-batch"))
                .spawn(move || {
                    // The receiver is gone if the wait already timed out.
                    let _ = tx.send(call(worker.as_ref(), blocks));
                })
                .map_err(|e| {
                    LzssError::dispatch(DispatchStage::Execute, format!("spawning batch thread: {e}"))
                })?;
            match rx.recv_timeout(limit) {
                Ok(result) => result?,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(LzssError::DispatchTimeout {
                        blocks: count,
                        timeout: limit,
                    })
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(LzssError::dispatch(
                        DispatchStage::Execute,
                        "batch thread exited without a result",
                    ))
                }
            }
        }
    };

    results.sort_unstable_by_key(BlockId::block_id);
    if results.len() != count {
        return Err(LzssError::dispatch(
            DispatchStage::Sync,
            format!(
                "{} backend returned {} results for {} blocks",
                dispatcher.name(),
                results.len(),
                count
            ),
        ));
    }
    if let Some((got, want)) = results
        .iter()
        .map(BlockId::block_id)
        .zip(expected.iter().copied())
        .find(|(got, want)| got != want)
    {
        return Err(LzssError::dispatch(
            DispatchStage::Sync,
            format!(
                "{} backend returned block {} where block {} was expected",
                dispatcher.name(),
                got,
                want
            ),
        ));
    }

    debug!(
        backend = dispatcher.name(),
        %op,
        blocks = count,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "batch complete"
    );
    Ok(results)
}
