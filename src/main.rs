use jit_shim::{Error, JitRegion};

/// Returns 0x0131C9C0.
#[cfg(target_arch = "x86_64")]
const RET_NUMBER: &[u8] = &[
    0xB8, 0xC0, 0xC9, 0x31, 0x01, // mov eax, 0x0131c9c0
    0xC3, // ret
];

#[cfg(target_arch = "aarch64")]
const RET_NUMBER: &[u8] = &[
    0x00, 0x38, 0x99, 0x52, // movz w0, #0xc9c0
    0x20, 0x26, 0xA0, 0x72, // movk w0, #0x0131, lsl #16
    0xC0, 0x03, 0x5F, 0xD6, // ret
];

/// Adds its two `i32` arguments.
#[cfg(all(target_arch = "x86_64", not(windows)))]
const ADD: &[u8] = &[
    0x8D, 0x04, 0x37, // lea eax, [rdi + rsi]
    0xC3, // ret
];

#[cfg(all(target_arch = "x86_64", windows))]
const ADD: &[u8] = &[
    0x8D, 0x04, 0x11, // lea eax, [rcx + rdx]
    0xC3, // ret
];

#[cfg(target_arch = "aarch64")]
const ADD: &[u8] = &[
    0x20, 0x00, 0x00, 0x0B, // add w0, w1, w0
    0xC0, 0x03, 0x5F, 0xD6, // ret
];

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn compile(name: &str, code: &[u8]) -> Result<JitRegion, Error> {
    JitRegion::from_code(code).map_err(|err| {
        log::error!("failed to JIT {name}: {err} (errno = {:?})", err.raw_os_error());
        err
    })
}

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn main() -> Result<(), Error> {
    env_logger::init();

    let ret_number = compile("ret_number", RET_NUMBER)?;
    let ret_number_fn: extern "C" fn() -> i32 =
        unsafe { std::mem::transmute(ret_number.entry().ok_or(Error::InvalidState)?) };
    println!("ret_number() = {}", ret_number_fn());
    ret_number.free()?;

    let add = compile("add", ADD)?;
    let add_entry = add.entry().ok_or(Error::InvalidState)?;
    let add_fn: extern "C" fn(i32, i32) -> i32 = unsafe { std::mem::transmute(add_entry) };
    println!("add(1, 2) = {}", add_fn(1, 2));
    println!("add(314159265, -256) = {}", add_fn(314159265, -256));
    add.free()?;

    Ok(())
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn main() {
    env_logger::init();

    log::error!("no demo machine code for this architecture");
    std::process::exit(1);
}
