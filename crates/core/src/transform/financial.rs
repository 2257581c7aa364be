//! Line amount derivation
//!
//! Amounts the source already supplies are kept; missing ones are derived
//! with every intermediate rounded to four decimals. Feeding the output back
//! in yields the same numbers.

use crate::model::CanonicalSaleLine;

/// Decimal places kept by intermediate results
pub const AMOUNT_SCALE: i32 = 4;

/// Round half away from zero to [`AMOUNT_SCALE`] decimals
pub fn round4(value: f64) -> f64 {
    let factor = 10f64.powi(AMOUNT_SCALE);
    let rounded = (value * factor).round() / factor;
    // Normalize negative zero
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Complete set of amounts of one sale line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineAmounts {
    pub discount_amount: f64,
    pub net_amount: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
}

/// Derive the amounts the source did not supply
pub fn derive_line_amounts(line: &CanonicalSaleLine, default_tax_rate: f64) -> LineAmounts {
    let gross = line.quantity * line.unit_price;

    let discount_amount = line
        .discount_amount
        .unwrap_or_else(|| round4(gross * line.discount / 100.0));
    let net_amount = line
        .net_amount
        .unwrap_or_else(|| round4(gross - discount_amount));
    let tax_rate = line.tax_rate.unwrap_or(default_tax_rate);
    let tax_amount = line
        .tax_amount
        .unwrap_or_else(|| round4(net_amount * tax_rate / 100.0));
    let total_amount = line
        .total_amount
        .unwrap_or_else(|| round4(net_amount + tax_amount));

    LineAmounts {
        discount_amount,
        net_amount,
        tax_rate,
        tax_amount,
        total_amount,
    }
}

/// Sums of line amounts, used when a sale header carries no totals
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SaleTotals {
    /// Before discounts, so that `total = subtotal - discount_amount + tax_amount`
    pub subtotal: f64,
    pub discount_amount: f64,
    pub tax_amount: f64,
    pub total: f64,
}

impl SaleTotals {
    pub fn add(&mut self, line: &LineAmounts) {
        self.subtotal = round4(self.subtotal + line.net_amount + line.discount_amount);
        self.discount_amount = round4(self.discount_amount + line.discount_amount);
        self.tax_amount = round4(self.tax_amount + line.tax_amount);
        self.total = round4(self.total + line.total_amount);
    }
}
