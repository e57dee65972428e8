#![allow(dead_code)]

/// Returns 0x0131C9C0, padded to exactly 10 bytes.
#[cfg(target_arch = "x86_64")]
pub const RET_CONSTANT: &[u8] = &[
    0xB8, 0xC0, 0xC9, 0x31, 0x01, // mov eax, 0x0131c9c0
    0x90, 0x90, 0x90, 0x90, // nop x4
    0xC3, // ret
];

#[cfg(target_arch = "aarch64")]
pub const RET_CONSTANT: &[u8] = &[
    0x00, 0x38, 0x99, 0x52, // movz w0, #0xc9c0
    0x20, 0x26, 0xA0, 0x72, // movk w0, #0x0131, lsl #16
    0xC0, 0x03, 0x5F, 0xD6, // ret
];

pub const CONSTANT: i32 = 0x0131C9C0;

#[cfg(all(target_arch = "x86_64", not(windows)))]
pub const ADD: &[u8] = &[
    0x8D, 0x04, 0x37, // lea eax, [rdi + rsi]
    0xC3, // ret
];

#[cfg(all(target_arch = "x86_64", windows))]
pub const ADD: &[u8] = &[
    0x8D, 0x04, 0x11, // lea eax, [rcx + rdx]
    0xC3, // ret
];

#[cfg(target_arch = "aarch64")]
pub const ADD: &[u8] = &[
    0x20, 0x00, 0x00, 0x0B, // add w0, w1, w0
    0xC0, 0x03, 0x5F, 0xD6, // ret
];

/// Runs `f` in a forked child and returns the raw wait status.
///
/// The child exits with 0 when `f` returns and 101 when it panics, unless a signal kills it first.
#[cfg(unix)]
pub fn run_in_child(f: impl FnOnce()) -> libc::c_int {
    unsafe {
        match libc::fork() {
            -1 => panic!("fork failed: {}", std::io::Error::last_os_error()),
            0 => {
                let ok = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).is_ok();
                libc::_exit(if ok { 0 } else { 101 });
            }
            pid => {
                let mut status = 0;
                assert_eq!(libc::waitpid(pid, &mut status, 0), pid);
                status
            }
        }
    }
}

/// Whether `status` says the child died from a memory access fault.
#[cfg(unix)]
pub fn killed_by_fault(status: libc::c_int) -> bool {
    libc::WIFSIGNALED(status)
        && matches!(libc::WTERMSIG(status), libc::SIGSEGV | libc::SIGBUS)
}
