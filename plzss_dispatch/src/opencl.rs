use ocl::{Buffer, ProQue};
use tracing::{debug, info};

use plzss_core::{
    max_encoded_len, DispatchStage, Dispatcher, EncodedBlock, LzssError, RawBlock, Result,
};

const STATUS_OK: u32 = 0;
const STATUS_CAPACITY: u32 = 1;
const STATUS_TRUNCATED: u32 = 2;
const STATUS_OVERRUN: u32 = 3;
const STATUS_TRAILING: u32 = 4;

/// OpenCL backend: uploads a batch into flat fixed-stride buffers and runs
/// one kernel work item per block.
///
/// There is no silent CPU fallback: device failures are reported with the
/// stage they happened in.
pub struct OpenClDispatcher {
    pro_que: ProQue,
}

fn at(stage: DispatchStage) -> impl Fn(ocl::Error) -> LzssError {
    move |e| LzssError::dispatch(stage, e.to_string())
}

impl OpenClDispatcher {
    /// Build the kernels on the default platform and device.
    pub fn new() -> Result<Self> {
        let src = include_str!("kernels/lzss.cl");
        let pro_que = ProQue::builder()
            .src(src)
            .build()
            .map_err(at(DispatchStage::Compile))?;
        info!(
            device = %pro_que.device().name().unwrap_or_else(|_| "unknown".into()),
            "opencl kernels built"
        );
        Ok(Self { pro_que })
    }

    fn buffer<T: ocl::OclPrm>(&self, len: usize) -> Result<Buffer<T>> {
        Buffer::<T>::builder()
            .queue(self.pro_que.queue().clone())
            .len(len.max(1))
            .build()
            .map_err(at(DispatchStage::Alloc))
    }

    fn upload<T: ocl::OclPrm>(&self, host: &[T]) -> Result<Buffer<T>> {
        let buf = self.buffer::<T>(host.len())?;
        if !host.is_empty() {
            buf.write(host).enq().map_err(at(DispatchStage::Transfer))?;
        }
        Ok(buf)
    }

    fn download<T: ocl::OclPrm>(buf: &Buffer<T>, host: &mut [T]) -> Result<()> {
        buf.read(host).enq().map_err(at(DispatchStage::Transfer))
    }

    fn run(&self, kernel: &ocl::Kernel, blocks: usize) -> Result<()> {
        unsafe {
            kernel
                .cmd()
                .global_work_size(blocks)
                .enq()
                .map_err(at(DispatchStage::Execute))?;
        }
        self.pro_que.queue().finish().map_err(at(DispatchStage::Sync))
    }
}

impl Dispatcher for OpenClDispatcher {
    fn name(&self) -> &'static str {
        "opencl"
    }

    fn encode_batch(&self, blocks: Vec<RawBlock>) -> Result<Vec<EncodedBlock>> {
        let n = blocks.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let raw_stride = blocks.iter().map(RawBlock::capacity).max().unwrap_or(0).max(1);
        let out_stride = max_encoded_len(raw_stride);

        let mut raw = vec![0u8; n * raw_stride];
        let mut raw_lens = Vec::with_capacity(n);
        for (slot, block) in raw.chunks_mut(raw_stride).zip(&blocks) {
            slot[..block.len()].copy_from_slice(block.as_bytes());
            raw_lens.push(block.len() as u32);
        }

        let raw_buf = self.upload(&raw)?;
        let lens_buf = self.upload(&raw_lens)?;
        let out_buf = self.buffer::<u8>(n * out_stride)?;
        let out_lens_buf = self.buffer::<u32>(n)?;
        let status_buf = self.buffer::<u32>(3 * n)?;

        let kernel = self
            .pro_que
            .kernel_builder("lzss_encode")
            .arg(&raw_buf)
            .arg(&lens_buf)
            .arg(raw_stride as u32)
            .arg(&out_buf)
            .arg(&out_lens_buf)
            .arg(out_stride as u32)
            .arg(&status_buf)
            .build()
            .map_err(at(DispatchStage::Compile))?;
        self.run(&kernel, n)?;

        let mut status = vec![0u32; 3 * n];
        let mut out_lens = vec![0u32; n];
        let mut out = vec![0u8; n * out_stride];
        Self::download(&status_buf, &mut status)?;
        Self::download(&out_lens_buf, &mut out_lens)?;
        Self::download(&out_buf, &mut out)?;
        debug!(blocks = n, "opencl encode batch read back");

        blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let id = block.id();
                if let Some(err) = status_error(id, &status[3 * i..3 * i + 3]) {
                    return Err(err);
                }
                let start = i * out_stride;
                let bytes = out[start..start + out_lens[i] as usize].to_vec();
                EncodedBlock::new(
                    id,
                    block.len() as u32,
                    bytes,
                    max_encoded_len(block.capacity()),
                )
            })
            .collect()
    }

    fn decode_batch(&self, blocks: Vec<EncodedBlock>, raw_capacity: usize) -> Result<Vec<RawBlock>> {
        let n = blocks.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        if let Some(block) = blocks.iter().find(|b| b.raw_len() as usize > raw_capacity) {
            return Err(LzssError::CapacityExceeded {
                block: block.id(),
                needed: block.raw_len() as usize,
                capacity: raw_capacity,
            });
        }
        let enc_stride = blocks.iter().map(EncodedBlock::len).max().unwrap_or(0).max(1);
        let out_stride = raw_capacity.max(1);

        let mut enc = vec![0u8; n * enc_stride];
        let mut enc_lens = Vec::with_capacity(n);
        let mut raw_lens = Vec::with_capacity(n);
        for (slot, block) in enc.chunks_mut(enc_stride).zip(&blocks) {
            slot[..block.len()].copy_from_slice(block.as_bytes());
            enc_lens.push(block.len() as u32);
            raw_lens.push(block.raw_len());
        }

        let enc_buf = self.upload(&enc)?;
        let enc_lens_buf = self.upload(&enc_lens)?;
        let raw_lens_buf = self.upload(&raw_lens)?;
        let out_buf = self.buffer::<u8>(n * out_stride)?;
        let status_buf = self.buffer::<u32>(3 * n)?;

        let kernel = self
            .pro_que
            .kernel_builder("lzss_decode")
            .arg(&enc_buf)
            .arg(&enc_lens_buf)
            .arg(enc_stride as u32)
            .arg(&raw_lens_buf)
            .arg(&out_buf)
            .arg(out_stride as u32)
            .arg(&status_buf)
            .build()
            .map_err(at(DispatchStage::Compile))?;
        self.run(&kernel, n)?;

        let mut status = vec![0u32; 3 * n];
        let mut out = vec![0u8; n * out_stride];
        Self::download(&status_buf, &mut status)?;
        Self::download(&out_buf, &mut out)?;
        debug!(blocks = n, "opencl decode batch read back");

        blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let id = block.id();
                let code = &status[3 * i..3 * i + 3];
                if let Some(err) = status_error(id, code) {
                    return Err(err);
                }
                let start = i * out_stride;
                let bytes = out[start..start + block.raw_len() as usize].to_vec();
                RawBlock::new(id, bytes, raw_capacity)
            })
            .collect()
    }
}

/// Map a kernel status triple to the codec error it stands for.
fn status_error(block: u32, code: &[u32]) -> Option<LzssError> {
    let (a, b) = (code[1] as usize, code[2] as usize);
    match code[0] {
        STATUS_OK => None,
        STATUS_CAPACITY => Some(LzssError::CapacityExceeded {
            block,
            needed: a,
            capacity: b,
        }),
        STATUS_TRUNCATED => Some(LzssError::TruncatedStream {
            block,
            needed_bits: a,
            remaining_bits: b,
        }),
        STATUS_OVERRUN => Some(LzssError::CorruptBlock {
            block,
            reason: format!("match of {b} bytes at output offset {a} overruns the block"),
        }),
        STATUS_TRAILING => Some(LzssError::CorruptBlock {
            block,
            reason: format!("{} unused bytes after the last symbol", a / 8),
        }),
        other => Some(LzssError::dispatch(
            DispatchStage::Execute,
            format!("block {block}: unknown kernel status {other}"),
        )),
    }
}
