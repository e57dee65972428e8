//! Minimal platform shim for JIT code generation.
//!
//! Allocates page-aligned read/write memory, flips it to read+execute once the code is written, and
//! gives it back to the OS. The free functions in [`virtual_memory`] mirror the raw OS contract and
//! trust the caller to pass the same size to every call; [`JitRegion`] keeps the size and state for
//! you.

pub mod ffi;
pub mod os;
pub mod region;
pub mod util;
pub mod virtual_memory;

use errno::Errno;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// The OS could not provide the mapping (address space or mapping count exhausted, or policy
    /// denied it).
    #[error("out of memory: {0}")]
    OutOfMemory(Errno),
    /// The address/length does not describe a mapping the OS knows about.
    #[error("invalid region: {0}")]
    InvalidRegion(Errno),
    /// The OS refused to make the region executable.
    #[error("writable to executable transition refused: {0}")]
    UnsupportedTransition(Errno),
    /// The instruction cache could not be synchronised, so the region was left writable.
    #[error("instruction cache flush failed: {0}")]
    CacheFlush(Errno),
    /// The requested size cannot be rounded to whole pages without overflowing.
    #[error("requested size is too large")]
    TooLarge,
    /// The region is not in a state that allows this operation.
    #[error("invalid region state")]
    InvalidState,
    /// An argument does not fit the region, e.g. a write past its requested length.
    #[error("invalid argument")]
    InvalidArgument,
}

impl Error {
    /// The OS error code captured when this error was raised, if it came from the OS.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::OutOfMemory(e)
            | Error::InvalidRegion(e)
            | Error::UnsupportedTransition(e)
            | Error::CacheFlush(e) => Some(e.0),
            Error::TooLarge | Error::InvalidState | Error::InvalidArgument => None,
        }
    }
}

pub use {
    os::{last_error, page_size},
    region::{JitRegion, RegionState},
    virtual_memory::{alloc, flush_instruction_cache, make_executable, release},
};
