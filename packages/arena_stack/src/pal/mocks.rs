use std::ptr::NonNull;

use crate::pal::MockPlatform;

/// Leaks a zeroed, 8-byte aligned buffer of at least `size` bytes, so that mocked reservations
/// are backed by real memory that tests can write to.
pub(crate) fn leaked_buffer(size: usize) -> NonNull<u8> {
    let words = vec![0_u64; size.div_ceil(8)].leak();

    NonNull::from(words).cast::<u8>()
}

/// A mock platform whose reservations succeed with real (leaked) memory and whose releases
/// are accepted without checks.
pub(crate) fn memory_backed_platform() -> MockPlatform {
    let mut platform = MockPlatform::new();

    platform
        .expect_reserve()
        .returning(|size, _| Ok(leaked_buffer(size)));
    platform.expect_release().return_const(());

    platform
}
