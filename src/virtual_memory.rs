use core::ptr::NonNull;

use errno::{errno, Errno};

use crate::os::{page_size, set_last_error};
use crate::util::mapping_len;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct MemoryFlags(pub u32);

impl MemoryFlags {
    /// Memory is readable.
    pub const ACCESS_READ: u32 = 0x00000001;

    /// Memory is writable.
    pub const ACCESS_WRITE: u32 = 0x00000002;

    /// Memory is executable.
    pub const ACCESS_EXECUTE: u32 = 0x00000004;

    /// Memory is readable and writable.
    pub const ACCESS_RW: u32 = Self::ACCESS_READ | Self::ACCESS_WRITE;

    /// Memory is readable and executable.
    pub const ACCESS_RX: u32 = Self::ACCESS_READ | Self::ACCESS_EXECUTE;

    pub fn contains(self, other: u32) -> bool {
        (self.0 & other) != 0
    }
}

/// Which OS call failed, used to classify the OS error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Map,
    Protect,
    Unmap,
}

cfgenius::cond! {
    if cfg(windows) {
        use winapi::shared::minwindef::DWORD;
        use winapi::shared::winerror::{ERROR_ACCESS_DENIED, ERROR_NOT_ENOUGH_MEMORY};
        use winapi::um::memoryapi::{VirtualAlloc, VirtualFree, VirtualProtect};
        use winapi::um::winnt::{
            MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE,
            PAGE_NOACCESS, PAGE_READONLY, PAGE_READWRITE,
        };

        const OUT_OF_ADDRESS_SPACE: i32 = ERROR_NOT_ENOUGH_MEMORY as i32;

        fn is_access_denied(err: Errno) -> bool {
            err.0 == ERROR_ACCESS_DENIED as i32
        }

        fn page_protection_from_memory_flags(memory_flags: MemoryFlags) -> DWORD {
            let x = memory_flags;

            match (
                x.contains(MemoryFlags::ACCESS_READ) || x.contains(MemoryFlags::ACCESS_WRITE),
                x.contains(MemoryFlags::ACCESS_WRITE),
                x.contains(MemoryFlags::ACCESS_EXECUTE),
            ) {
                (_, true, true) => PAGE_EXECUTE_READWRITE,
                (_, false, true) => PAGE_EXECUTE_READ,
                (_, true, false) => PAGE_READWRITE,
                (true, false, false) => PAGE_READONLY,
                (false, false, false) => PAGE_NOACCESS,
            }
        }
    } else {
        use libc::{EACCES, ENOMEM, EPERM, PROT_EXEC, PROT_READ, PROT_WRITE};

        const OUT_OF_ADDRESS_SPACE: i32 = ENOMEM;

        fn is_access_denied(err: Errno) -> bool {
            matches!(err.0, EACCES | EPERM)
        }

        fn mm_prot_from_memory_flags(memory_flags: MemoryFlags) -> i32 {
            let mut prot = 0;

            let x = memory_flags;
            if x.contains(MemoryFlags::ACCESS_READ) { prot |= PROT_READ }
            if x.contains(MemoryFlags::ACCESS_WRITE) { prot |= PROT_WRITE }
            if x.contains(MemoryFlags::ACCESS_EXECUTE) { prot |= PROT_EXEC }

            prot
        }
    }
}

fn error_from_errno(op: Operation, err: Errno) -> Error {
    match op {
        Operation::Map => Error::OutOfMemory(err),
        Operation::Protect if is_access_denied(err) => Error::UnsupportedTransition(err),
        Operation::Protect | Operation::Unmap => Error::InvalidRegion(err),
    }
}

/// Builds the error for a failed OS call. The thread's last error is restored after logging so
/// errno-style callers still see the code of the failing call.
fn os_failure(op: Operation, ptr: *const u8, len: usize) -> Error {
    let err = errno();
    log::debug!("{op:?} of {len:#x} bytes at {ptr:p} failed: {err}");
    set_last_error(err);

    error_from_errno(op, err)
}

/// Number of bytes mapped for a request of `size` bytes on this host.
///
/// Every operation on a region recomputes this from the size the caller passes in.
pub fn region_len(size: usize) -> Result<usize, Error> {
    match mapping_len(size, page_size()) {
        Some(len) => Ok(len),
        None => {
            log::debug!("cannot round {size:#x} bytes to whole pages");
            set_last_error(Errno(OUT_OF_ADDRESS_SPACE));
            Err(Error::TooLarge)
        }
    }
}

/// Maps a new private, anonymous, zero-filled read/write region of at least `size` bytes.
///
/// The returned pointer is page aligned. `size == 0` maps a single page.
pub fn alloc(size: usize) -> Result<NonNull<u8>, Error> {
    let len = region_len(size)?;
    let flags = MemoryFlags(MemoryFlags::ACCESS_RW);
    let ptr;

    cfgenius::cond! {
        if cfg(windows) {
            ptr = unsafe {
                VirtualAlloc(
                    core::ptr::null_mut(),
                    len,
                    MEM_COMMIT | MEM_RESERVE,
                    page_protection_from_memory_flags(flags),
                )
            };
        } else {
            ptr = unsafe {
                let ptr = libc::mmap(
                    core::ptr::null_mut(),
                    len,
                    mm_prot_from_memory_flags(flags),
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                );

                if ptr == libc::MAP_FAILED {
                    core::ptr::null_mut()
                } else {
                    ptr
                }
            };
        }
    }

    match NonNull::new(ptr.cast::<u8>()) {
        Some(ptr) => {
            log::trace!("mapped {len:#x} bytes at {ptr:p}");
            Ok(ptr)
        }
        None => Err(os_failure(Operation::Map, core::ptr::null(), len)),
    }
}

/// Changes the protection of the pages covering `[p, p + region_len(size))`.
///
/// # Safety
///
/// `p` must be the base address of a live region returned by [`alloc`] and `size` the size it was
/// allocated with. Removing access from memory that is still referenced elsewhere makes those
/// references fault.
pub unsafe fn protect(p: *mut u8, size: usize, memory_flags: MemoryFlags) -> Result<(), Error> {
    let len = region_len(size)?;
    let ok;

    cfgenius::cond! {
        if cfg(windows) {
            let mut old: DWORD = 0;
            ok = VirtualProtect(
                p.cast(),
                len,
                page_protection_from_memory_flags(memory_flags),
                &mut old,
            ) != 0;
        } else {
            ok = libc::mprotect(p.cast(), len, mm_prot_from_memory_flags(memory_flags)) == 0;
        }
    }

    if ok {
        log::trace!("protected {len:#x} bytes at {p:p} as {memory_flags:?}");
        Ok(())
    } else {
        Err(os_failure(Operation::Protect, p, len))
    }
}

/// Makes a region written through [`alloc`] executable.
///
/// Flushes the instruction cache for the whole mapped span first, then switches the pages to
/// read+execute. After this returns `Ok` the region is no longer writable.
///
/// # Safety
///
/// Same contract as [`protect`]. The region must currently be writable and must not be written to
/// afterwards.
pub unsafe fn make_executable(start: *mut u8, size: usize) -> Result<(), Error> {
    let len = region_len(size)?;

    flush_instruction_cache(start, len)?;
    protect(start, size, MemoryFlags(MemoryFlags::ACCESS_RX))
}

/// Returns a region obtained from [`alloc`] to the OS.
///
/// # Safety
///
/// `start` must be the base address returned by [`alloc`] for a region that has not been released
/// yet, and `size` the size it was allocated with. Nothing may access the region afterwards,
/// whatever this returns.
pub unsafe fn release(start: *mut u8, size: usize) -> Result<(), Error> {
    let len = region_len(size)?;
    let ok;

    cfgenius::cond! {
        if cfg(windows) {
            ok = VirtualFree(start.cast(), 0, MEM_RELEASE) != 0;
        } else {
            ok = libc::munmap(start.cast(), len) == 0;
        }
    }

    if ok {
        log::trace!("unmapped {len:#x} bytes at {start:p}");
        Ok(())
    } else {
        Err(os_failure(Operation::Unmap, start, len))
    }
}

/// Converts a failed cache maintenance call into an [`Error`], leaving its code as the thread's
/// last error.
#[cfg_attr(not(target_arch = "riscv64"), allow(dead_code))]
fn flush_failure(p: *const u8, size: usize, err: std::io::Error) -> Error {
    let err = Errno(err.raw_os_error().unwrap_or(0));
    log::debug!("instruction cache flush of {size:#x} bytes at {p:p} failed: {err}");
    set_last_error(err);

    Error::CacheFlush(err)
}

/// Flushes instruction cache in the given region.
///
/// A no-op on x86, where instruction fetch is coherent with data writes. Everywhere else this must
/// run after the code is written and before it is executed.
///
/// # Safety
///
/// `[p, p + size)` must be mapped.
pub unsafe fn flush_instruction_cache(p: *const u8, size: usize) -> Result<(), Error> {
    cfgenius::cond! {
        if cfg(any(target_arch="x86", target_arch="x86_64")) {
            let _ = p;
            let _ = size;
        } else if cfg(target_vendor="apple") {
            extern "C" {
                fn sys_icache_invalidate(p: *const u8, size: usize);
            }

            sys_icache_invalidate(p, size);
        } else if cfg(windows) {
            use winapi::um::processthreadsapi::{FlushInstructionCache, GetCurrentProcess};

            if FlushInstructionCache(GetCurrentProcess(), p.cast(), size) == 0 {
                return Err(flush_failure(p, size, std::io::Error::last_os_error()));
            }
        } else if cfg(target_arch="aarch64") {
            use core::arch::asm;

            // CTR_EL0 holds log2 of the smallest D and I cache line sizes, in words.
            let ctr: u64;
            asm!("mrs {}, ctr_el0", out(reg) ctr, options(nomem, nostack, preserves_flags));

            let dcache_line_size = 4usize << ((ctr >> 16) & 0xf);
            let icache_line_size = 4usize << (ctr & 0xf);

            let code = p as usize;
            let end = code + size;

            let mut addr = code & !(dcache_line_size - 1);
            while addr < end {
                asm!("dc cvau, {}", in(reg) addr, options(nostack, preserves_flags));
                addr += dcache_line_size;
            }

            asm!("dsb ish", options(nostack, preserves_flags));

            addr = code & !(icache_line_size - 1);
            while addr < end {
                asm!("ic ivau, {}", in(reg) addr, options(nostack, preserves_flags));
                addr += icache_line_size;
            }

            asm!("dsb ish", options(nostack, preserves_flags));
            asm!("isb", options(nostack, preserves_flags));
        } else if cfg(target_arch="riscv64") {
            wasmtime_jit_icache_coherence::clear_cache(p.cast(), size)
                .map_err(|err| flush_failure(p, size, err))?;
            wasmtime_jit_icache_coherence::pipeline_flush_mt()
                .map_err(|err| flush_failure(p, size, err))?;
        } else {
            compile_error!("instruction cache maintenance is not implemented for this target");
        }
    }

    Ok(())
}
