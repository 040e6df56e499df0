#[cfg(feature = "opencl")]
mod opencl;
mod threads;

#[cfg(feature = "opencl")]
pub use opencl::OpenClDispatcher;
pub use threads::ThreadPoolDispatcher;

use std::sync::Arc;

use plzss_core::{Dispatcher, LzssError, Result, SequentialDispatcher};

/// Backend names accepted by [`dispatcher_by_name`] in this build.
pub const BACKENDS: &[&str] = &[
    "threads",
    "sequential",
    #[cfg(feature = "opencl")]
    "opencl",
];

/// Resolve a backend from its CLI name.
///
/// `threads` sizes the rayon pool; the other backends ignore it.
pub fn dispatcher_by_name(name: &str, threads: Option<usize>) -> Result<Arc<dyn Dispatcher>> {
    match name {
        "sequential" => Ok(Arc::new(SequentialDispatcher)),
        "threads" => Ok(Arc::new(ThreadPoolDispatcher::new(threads)?)),
        #[cfg(feature = "opencl")]
        "opencl" => Ok(Arc::new(OpenClDispatcher::new()?)),
        #[cfg(not(feature = "opencl"))]
        "opencl" => Err(LzssError::Config(
            "this build has no OpenCL support; rebuild with --features opencl".into(),
        )),
        other => Err(LzssError::Config(format!(
            "unknown backend {other:?}; expected one of {}",
            BACKENDS.join(", ")
        ))),
    }
}
