pub mod block;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod lzss;
pub mod pipeline;
pub mod reader;
pub mod segment;
pub mod writer;

pub use block::{max_encoded_len, BlockId, EncodedBlock, RawBlock};
pub use codec::{decode_block, encode_block, symbols};
pub use config::Config;
pub use dispatch::{dispatch_decode, dispatch_encode, Dispatcher, Operation, SequentialDispatcher};
pub use error::{DispatchStage, LzssError, Result};
pub use format::{Plz1Header, RecordInfo, HEADER_SIZE, MAGIC};
pub use pipeline::{
    compress, compress_file, compress_stream, decompress, decompress_file, decompress_stream,
    CompressSummary, DecompressSummary,
};
pub use reader::Reader;
pub use segment::{split, BlockReader};
pub use writer::Writer;
