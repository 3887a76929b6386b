//! Utility functions for the FAST segment test

/// Pack a circular array of flags into a 16-bit ring mask, bit `i` = `pixels[i]`
pub fn ring_mask(pixels: &[bool; 16]) -> u16 {
    let mut mask: u16 = 0;
    for (i, &pixel) in pixels.iter().enumerate() {
        if pixel {
            mask |= 1 << i;
        }
    }
    mask
}

/// Check if the circular ring mask holds at least `min_count` consecutive set bits
pub fn has_contiguous_run(mask: u16, min_count: usize) -> bool {
    if min_count > 16 || min_count == 0 {
        return false;
    }
    if mask == u16::MAX {
        return true;
    }

    // For a run of length n: mask & rotl(mask, 1) & ... & rotl(mask, n-1)
    let mut test_mask = mask;
    for i in 1..min_count {
        test_mask &= mask.rotate_left(i as u32);
        if test_mask == 0 {
            return false;
        }
    }

    test_mask != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Straightforward scan over two laps of the ring
    fn has_run_by_scan(pixels: &[bool; 16], min_count: usize) -> bool {
        if min_count > 16 || min_count == 0 {
            return false;
        }
        let mut current = 0;
        for i in 0..32 {
            if pixels[i % 16] {
                current += 1;
                if current >= min_count {
                    return true;
                }
            } else {
                current = 0;
            }
        }
        false
    }

    #[test]
    fn test_contiguous_run_simple() {
        let mut pixels = [false; 16];
        for p in pixels.iter_mut().take(9) {
            *p = true;
        }
        let mask = ring_mask(&pixels);
        assert!(has_contiguous_run(mask, 9));
        assert!(!has_contiguous_run(mask, 10));
    }

    #[test]
    fn test_contiguous_run_wrap_around() {
        let mut pixels = [false; 16];
        for p in pixels.iter_mut().skip(12) {
            *p = true;
        }
        for p in pixels.iter_mut().take(5) {
            *p = true;
        }
        assert!(has_contiguous_run(ring_mask(&pixels), 9));
    }

    #[test]
    fn test_alternating_has_no_run() {
        let mut pixels = [false; 16];
        for i in (0..16).step_by(2) {
            pixels[i] = true;
        }
        assert!(!has_contiguous_run(ring_mask(&pixels), 2));
        assert!(has_contiguous_run(ring_mask(&pixels), 1));
    }

    #[test]
    fn test_degenerate_lengths() {
        assert!(!has_contiguous_run(u16::MAX, 0));
        assert!(!has_contiguous_run(u16::MAX, 17));
        assert!(has_contiguous_run(u16::MAX, 16));
        assert!(!has_contiguous_run(0x7fff, 16));
    }

    #[test]
    fn test_bitmask_matches_scan() {
        for bits in [0u16, 0x01ff, 0xf00f, 0xaaaa, 0x7ffe, 0xff80, 0x3c3c, 0xfffe] {
            let mut pixels = [false; 16];
            for (i, p) in pixels.iter_mut().enumerate() {
                *p = bits & (1 << i) != 0;
            }
            assert_eq!(ring_mask(&pixels), bits);
            for n in 1..=16 {
                assert_eq!(
                    has_contiguous_run(bits, n),
                    has_run_by_scan(&pixels, n),
                    "mismatch for mask={bits:#06x} n={n}"
                );
            }
        }
    }
}
