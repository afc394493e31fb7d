use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// A resource quantity. Item networks carry whole values; fluid networks
/// may carry fractional values. Always non-negative.
pub type Quantity = Fixed64;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Quantity of a whole number of items.
#[inline]
pub fn qty(v: u32) -> Quantity {
    Quantity::from_num(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed64_basic_arithmetic() {
        let a = f64_to_fixed64(1.5);
        let b = f64_to_fixed64(2.0);
        assert_eq!(fixed64_to_f64(a + b), 3.5);
    }

    #[test]
    fn fixed64_determinism() {
        let a = f64_to_fixed64(1.0 / 3.0);
        let b = f64_to_fixed64(1.0 / 3.0);
        assert_eq!(a, b);
        assert_eq!(a * f64_to_fixed64(3.0), b * f64_to_fixed64(3.0));
    }

    #[test]
    fn whole_quantities() {
        assert_eq!(qty(5), f64_to_fixed64(5.0));
        assert_eq!(qty(0), Quantity::ZERO);
    }

    #[test]
    fn fractional_quantities_order() {
        let half = f64_to_fixed64(0.5);
        assert!(half < qty(1));
        assert!(half > Quantity::ZERO);
    }
}
