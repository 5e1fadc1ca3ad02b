//! Integer-peso amount helpers.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! The authority's document format carries whole currency units; every
//! amount that lands in a document or stamp is rounded here, with banker's
//! rounding, so totals reconcile with the stamp's total field.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds an amount to whole pesos using banker's rounding
/// (round half to even).
#[must_use]
pub fn round_peso(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
}

/// Renders an amount the way the authority expects it: whole pesos,
/// no separators, no decimal point.
#[must_use]
pub fn to_peso_string(amount: Decimal) -> String {
    round_peso(amount).normalize().to_string()
}
