mod common;

use std::collections::HashSet;
use std::thread;

use jit_shim::virtual_memory::{alloc, make_executable, release};
use jit_shim::{page_size, Error, JitRegion, RegionState};

#[test]
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn end_to_end_constant() {
    let size = common::RET_CONSTANT.len();
    let ptr = alloc(size).unwrap();

    unsafe {
        std::ptr::copy_nonoverlapping(common::RET_CONSTANT.as_ptr(), ptr.as_ptr(), size);
        make_executable(ptr.as_ptr(), size).unwrap();

        let f: extern "C" fn() -> i32 = std::mem::transmute(ptr.as_ptr());
        assert_eq!(f(), common::CONSTANT);

        release(ptr.as_ptr(), size).unwrap();
    }
}

#[test]
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn region_runs_add() {
    let region = JitRegion::from_code(common::ADD).unwrap();
    let entry = region.entry().unwrap();

    let add: extern "C" fn(i32, i32) -> i32 = unsafe { std::mem::transmute(entry) };
    assert_eq!(add(1, 2), 3);
    assert_eq!(add(314159265, -256), 314159009);
    assert_eq!(add(i32::MAX, 1), i32::MIN);

    region.free().unwrap();
}

#[test]
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn code_spanning_pages() {
    let page = page_size();
    let size = page + common::RET_CONSTANT.len();

    let mut region = JitRegion::new(size).unwrap();
    assert_eq!(region.mapped_len(), 2 * page);

    // entry point lives on the second page, so both pages must be executable
    region.write(page, common::RET_CONSTANT).unwrap();
    region.make_executable().unwrap();

    let f: extern "C" fn() -> i32 = unsafe { std::mem::transmute(region.as_ptr().add(page)) };
    assert_eq!(f(), common::CONSTANT);
}

#[test]
fn many_sizes_round_trip() {
    let page = page_size();

    for size in [0, 1, 10, page - 1, page, page + 1, 20 * 1024] {
        let mut region = JitRegion::new(size).unwrap();
        assert_eq!(region.as_ptr() as usize % page, 0);
        assert!(region.mapped_len() >= size.max(1));

        let pattern: Vec<u8> = (0..size).map(|i| (i % 253) as u8).collect();
        region.write(0, &pattern).unwrap();
        assert_eq!(region.as_slice(), &pattern[..]);

        region.make_executable().unwrap();
        assert_eq!(region.state(), RegionState::Executable);
        assert_eq!(region.as_slice(), &pattern[..]);

        region.free().unwrap();
    }
}

#[test]
fn concurrent_allocations_are_disjoint() {
    let page = page_size();

    let bases: Vec<usize> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                s.spawn(move || {
                    (0..16)
                        .map(|j| JitRegion::new((i * 16 + j) * 64).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let regions: Vec<JitRegion> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        let bases = regions.iter().map(|r| r.as_ptr() as usize).collect();
        for region in regions {
            region.free().unwrap();
        }
        bases
    });

    let unique: HashSet<_> = bases.iter().copied().collect();
    assert_eq!(unique.len(), bases.len());
    assert!(bases.iter().all(|b| b % page == 0));
}

#[test]
fn from_code_empty() {
    let mut region = JitRegion::from_code(&[]).unwrap();

    assert!(region.is_empty());
    assert_eq!(region.state(), RegionState::Executable);
    assert_eq!(region.write(0, &[]), Err(Error::InvalidState));
}
