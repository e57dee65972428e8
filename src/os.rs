use errno::Errno;

/// Returns the virtual memory page size of the host, in bytes.
///
/// The OS is queried on every call.
pub fn page_size() -> usize {
    cfgenius::cond! {
        if cfg(windows) {
            use core::mem::MaybeUninit;
            use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};

            let mut info: MaybeUninit<SYSTEM_INFO> = MaybeUninit::zeroed();

            unsafe {
                GetSystemInfo(info.as_mut_ptr());
                return info.assume_init().dwPageSize as usize;
            }
        } else {
            return unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize };
        }
    }
}

/// Returns the last OS error code recorded for the calling thread (`errno`, or `GetLastError()` on
/// Windows).
///
/// Only meaningful when read right after a failure and before any other call that may touch the OS.
/// Prefer the [`Error`](crate::Error) returned by the failing operation, which already carries the
/// same code.
pub fn last_error() -> Errno {
    errno::errno()
}

/// Overwrites the calling thread's last OS error code.
pub fn set_last_error(err: Errno) {
    errno::set_errno(err)
}
