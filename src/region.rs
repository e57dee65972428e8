use core::ptr::NonNull;

use crate::virtual_memory::{self, region_len};
use crate::Error;

/// Where a [`JitRegion`] is in its lifecycle. A freed region no longer exists as a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegionState {
    /// Read+write, not executable. Code is written in this state.
    Writable,
    /// Read+execute, not writable.
    Executable,
}

/// An owned block of JIT memory.
///
/// Remembers the size it was allocated with, so making it executable and freeing it always act on
/// exactly the pages that were mapped. Dropping the region unmaps it.
#[derive(Debug)]
pub struct JitRegion {
    ptr: NonNull<u8>,
    size: usize,
    state: RegionState,
}

// SAFETY: the mapping is owned exclusively by the handle and carries no thread affinity.
unsafe impl Send for JitRegion {}

impl JitRegion {
    /// Allocates a zero-filled, writable region of at least `size` bytes.
    pub fn new(size: usize) -> Result<Self, Error> {
        let ptr = virtual_memory::alloc(size)?;

        Ok(Self {
            ptr,
            size,
            state: RegionState::Writable,
        })
    }

    /// Allocates a region holding `code` and makes it executable.
    ///
    /// The region is released again if any step fails.
    pub fn from_code(code: &[u8]) -> Result<Self, Error> {
        let mut region = Self::new(code.len())?;

        region.write(0, code)?;
        region.make_executable()?;

        Ok(region)
    }

    /// Size requested at allocation.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of bytes actually mapped (the requested size rounded up to whole pages).
    pub fn mapped_len(&self) -> usize {
        // cannot fail, the same computation succeeded during allocation
        region_len(self.size).unwrap_or(self.size)
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    /// The first `len()` bytes of the region. Readable in every state.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// Mutable view of the first `len()` bytes, only while the region is writable.
    pub fn as_mut_slice(&mut self) -> Result<&mut [u8], Error> {
        if self.state != RegionState::Writable {
            return Err(Error::InvalidState);
        }

        Ok(unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) })
    }

    /// Copies `bytes` into the region starting at `offset`.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Error> {
        let slice = self.as_mut_slice()?;

        let end = offset
            .checked_add(bytes.len())
            .ok_or(Error::InvalidArgument)?;
        slice
            .get_mut(offset..end)
            .ok_or(Error::InvalidArgument)?
            .copy_from_slice(bytes);

        Ok(())
    }

    /// Flushes the instruction cache and switches the region to read+execute.
    pub fn make_executable(&mut self) -> Result<(), Error> {
        if self.state != RegionState::Writable {
            return Err(Error::InvalidState);
        }

        unsafe { virtual_memory::make_executable(self.ptr.as_ptr(), self.size)? };
        self.state = RegionState::Executable;

        Ok(())
    }

    /// Address of the first instruction, once the region is executable.
    ///
    /// Cast it to the `extern "C" fn` type matching the code that was written.
    pub fn entry(&self) -> Option<*const u8> {
        match self.state {
            RegionState::Executable => Some(self.as_ptr()),
            RegionState::Writable => None,
        }
    }

    /// Releases the region, reporting whether the OS accepted it.
    pub fn free(self) -> Result<(), Error> {
        let this = core::mem::ManuallyDrop::new(self);

        unsafe { virtual_memory::release(this.ptr.as_ptr(), this.size) }
    }
}

impl Drop for JitRegion {
    fn drop(&mut self) {
        if let Err(err) = unsafe { virtual_memory::release(self.ptr.as_ptr(), self.size) } {
            log::warn!("failed to release JIT region at {:p}: {err}", self.ptr);
        }
    }
}
