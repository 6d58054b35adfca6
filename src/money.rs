//! Rounding rules for amounts and percentages
//!
//! Every figure in an assessment passes through one of these helpers so two
//! runs over the same snapshot produce identical decimals.

use rust_decimal::{Decimal, RoundingStrategy};

pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Round half-up to `dp` decimal places (ties go toward positive infinity)
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    let strategy = if value.is_sign_negative() {
        RoundingStrategy::MidpointTowardZero
    } else {
        RoundingStrategy::MidpointAwayFromZero
    };
    value.round_dp_with_strategy(dp, strategy)
}

/// Round an amount to the cent
pub fn round_cents(value: Decimal) -> Decimal {
    round_half_up(value, 2)
}

/// Round a percentage (0-100 scale) to 2 decimal places
pub fn round_percentage(value: Decimal) -> Decimal {
    round_half_up(value, 2)
}

/// `part` as a percentage of `whole`, 0 when `whole` is not positive
pub fn percentage_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_percentage(part * HUNDRED / whole)
}

/// Apply a percentage (0-100 scale) to an amount, rounded to the cent
pub fn apply_percentage(amount: Decimal, percentage: Decimal) -> Decimal {
    round_cents(amount * percentage / HUNDRED)
}
