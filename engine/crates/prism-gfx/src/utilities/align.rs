/// align 必须是 2 的幂
#[inline]
pub const fn align_up(x: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (x + (align - 1)) & !(align - 1)
}

#[inline]
pub const fn align_up_u64(x: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (x + (align - 1)) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 32), 96);
        assert_eq!(align_up_u64(33, 16), 48);
    }
}
