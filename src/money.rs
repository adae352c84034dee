use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits every stored amount and balance is kept at.
pub const SCALE: u32 = 4;

/// Total significant digits a stored amount or balance may use.
pub const PRECISION: u32 = 19;

/// Largest representable amount or balance: 15 integer digits and [`SCALE`]
/// fractional digits.
pub fn max_value() -> Decimal {
    Decimal::from_i128_with_scale(10i128.pow(PRECISION) - 1, SCALE)
}

/// `true` if the value fits `PRECISION` digits at `SCALE` fractional digits.
pub fn fits(value: Decimal) -> bool {
    value.abs() <= max_value()
}

/// Rounds an incoming amount to [`SCALE`] fractional digits.
///
/// Midpoints round to even.
pub fn normalize(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointNearestEven)
}
