//! C ABI for foreign hosts.
//!
//! Failures are reported with a null pointer or `-1`; the cause is read afterwards with
//! [`get_errno`], before any other call that may touch the OS.

use core::ffi::{c_int, c_void};
use core::ptr::null_mut;

use crate::os;
use crate::virtual_memory;

#[no_mangle]
pub extern "C" fn get_page_size() -> usize {
    os::page_size()
}

/// Returns a page-aligned, zero-filled read/write region of at least `size` bytes, or null.
#[no_mangle]
pub extern "C" fn jit_alloc(size: usize) -> *mut c_void {
    match virtual_memory::alloc(size) {
        Ok(ptr) => ptr.as_ptr().cast(),
        Err(_) => null_mut(),
    }
}

/// Returns 0 once the region is read+execute, -1 otherwise.
///
/// # Safety
///
/// `start` must come from [`jit_alloc`] and not have been freed; `size` must be the size passed to
/// that call.
#[no_mangle]
pub unsafe extern "C" fn jit_make_executable(start: *mut c_void, size: usize) -> c_int {
    match virtual_memory::make_executable(start.cast(), size) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Returns 0 once the region is unmapped, -1 otherwise.
///
/// # Safety
///
/// Same as [`jit_make_executable`]. `start` must not be used afterwards, whatever this returns.
#[no_mangle]
pub unsafe extern "C" fn jit_free(start: *mut c_void, size: usize) -> c_int {
    match virtual_memory::release(start.cast(), size) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

#[no_mangle]
pub extern "C" fn get_errno() -> c_int {
    os::last_error().0
}
