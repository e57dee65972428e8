pub fn align_down(x: usize, alignment: usize) -> usize {
    x & !(alignment - 1)
}

/// Rounds `size` up to the next multiple of `page_size`, i.e. `ceil(size / page_size) * page_size`.
///
/// Returns `None` if the rounded value does not fit in a `usize`.
///
/// # Panics
///
/// Panics if `page_size` is not a power of two. Every other operation in this crate depends on the
/// bitmask rounding being exact, so a bogus page size is treated as a bug rather than an error.
pub fn round_up_to_page(size: usize, page_size: usize) -> Option<usize> {
    assert!(
        page_size.is_power_of_two(),
        "page size {page_size:#x} is not a power of two"
    );

    size.checked_add(page_size - 1)
        .map(|end| align_down(end, page_size))
}

/// The number of bytes actually mapped for a region of `size` requested bytes.
///
/// Same as [`round_up_to_page`] except that a zero-sized request still maps one page. Allocation,
/// protection and release all compute their span through this function.
pub fn mapping_len(size: usize, page_size: usize) -> Option<usize> {
    round_up_to_page(size, page_size).map(|len| len.max(page_size))
}
