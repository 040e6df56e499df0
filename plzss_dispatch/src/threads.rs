use std::panic::{self, AssertUnwindSafe};

use plzss_core::{
    decode_block, encode_block, DispatchStage, Dispatcher, EncodedBlock, LzssError, RawBlock,
    Result,
};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Rayon thread pool backend: one task per block.
///
/// The pool is private to the dispatcher so block work never competes with
/// other rayon users in the process.
pub struct ThreadPoolDispatcher {
    pool: ThreadPool,
}

impl ThreadPoolDispatcher {
    /// `threads = None` uses one thread per logical CPU.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("plzss-worker-{i}"));
        if let Some(n) = threads {
            if n == 0 {
                return Err(LzssError::Config("thread count must be at least 1".into()));
            }
            builder = builder.num_threads(n);
        }
        let pool = builder.build().map_err(|e| {
            LzssError::dispatch(DispatchStage::Compile, format!("failed to create thread pool: {e}"))
        })?;
        debug!(threads = pool.current_num_threads(), "thread pool ready");
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `work` on the pool, turning a worker panic into an execute error.
    fn run<T: Send>(&self, work: impl FnOnce() -> Result<T> + Send) -> Result<T> {
        panic::catch_unwind(AssertUnwindSafe(|| self.pool.install(work))).unwrap_or_else(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            Err(LzssError::dispatch(
                DispatchStage::Execute,
                format!("worker panicked: {reason}"),
            ))
        })
    }
}

impl Dispatcher for ThreadPoolDispatcher {
    fn name(&self) -> &'static str {
        "threads"
    }

    fn encode_batch(&self, blocks: Vec<RawBlock>) -> Result<Vec<EncodedBlock>> {
        self.run(|| blocks.par_iter().map(encode_block).collect())
    }

    fn decode_batch(&self, blocks: Vec<EncodedBlock>, raw_capacity: usize) -> Result<Vec<RawBlock>> {
        self.run(|| {
            blocks
                .par_iter()
                .map(|block| decode_block(block, raw_capacity))
                .collect()
        })
    }
}
