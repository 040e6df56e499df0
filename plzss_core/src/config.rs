use std::time::Duration;

use crate::error::{LzssError, Result};
use crate::format::{DEFAULT_BLOCK_SIZE, DEFAULT_PARALLEL_THRESHOLD, MAX_BLOCK_SIZE};
use crate::lzss::MIN_MATCH;

/// Runtime configuration for the compress and decompress pipelines.
#[derive(Debug, Clone)]
pub struct Config {
    /// Raw bytes per block. Ignored on decompress, where the header decides.
    pub block_size: u32,
    /// Inputs smaller than this run on the sequential dispatcher.
    pub parallel_threshold: u64,
    /// Blocks handed to the dispatcher per batch; bounds memory use.
    pub max_batch_blocks: usize,
    /// Give up on a batch that has not completed after this long.
    pub dispatch_timeout: Option<Duration>,
    /// Store an xxh3-64 checksum with every record.
    pub checksums: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            max_batch_blocks: 16,
            dispatch_timeout: None,
            checksums: true,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if (self.block_size as usize) < MIN_MATCH {
            return Err(LzssError::Config(format!(
                "block size {} is below the minimum match length {}",
                self.block_size, MIN_MATCH
            )));
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(LzssError::Config(format!(
                "block size {} exceeds the {} byte maximum",
                self.block_size, MAX_BLOCK_SIZE
            )));
        }
        if self.max_batch_blocks == 0 {
            return Err(LzssError::Config("batch size must be at least one block".into()));
        }
        if self.dispatch_timeout == Some(Duration::ZERO) {
            return Err(LzssError::Config("dispatch timeout must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn block_size_must_fit_the_format_limits() {
        let at_max = Config {
            block_size: MAX_BLOCK_SIZE,
            ..Config::default()
        };
        assert!(at_max.validate().is_ok());

        for block_size in [2, MAX_BLOCK_SIZE + 1, u32::MAX] {
            let config = Config {
                block_size,
                ..Config::default()
            };
            assert!(
                matches!(config.validate(), Err(LzssError::Config(_))),
                "block size {block_size} accepted"
            );
        }
    }
}
