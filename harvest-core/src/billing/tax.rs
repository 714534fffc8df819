use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::models::{LineItem, PricedLine};

/// Central and state GST, each 2.5%, charged on intra-state sales.
const SPLIT_RATE: Decimal = Decimal::from_parts(25, 0, 0, false, 3);

/// Integrated GST, 5%, charged on inter-state sales.
const UNIFIED_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Tax breakdown for one invoice.
///
/// Exactly one of `cgst + sgst` and `igst` is non-zero for a non-empty
/// invoice, and `total` is the rounded sum of the other five fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    #[serde(rename = "subTotal")]
    pub subtotal: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

/// Rounds to two fractional digits, halves away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Whether `shipping_state` is the seller's own state.
///
/// Both sides are trimmed and compared case-insensitively.
pub fn is_home_state(shipping_state: &str, home_state: &str) -> bool {
    shipping_state.trim().to_lowercase() == home_state.trim().to_lowercase()
}

/// Computes subtotal, tax components and total for a set of line items.
///
/// # Arguments
///
/// * `items` - Line items; each contributes `round2(qty * rate)`
/// * `shipping_state` - Customer's shipping state
/// * `shipping` - Caller-supplied shipping charge (not computed here)
/// * `home_state` - Seller's home state
///
/// Negative quantities or rates are not rejected here; request validation
/// happens before this is called.
pub fn compute_totals(
    items: &[LineItem],
    shipping_state: &str,
    shipping: Decimal,
    home_state: &str,
) -> Totals {
    let subtotal: Decimal = items.iter().map(|item| round2(item.qty * item.rate)).sum();

    let (cgst, sgst, igst) = if is_home_state(shipping_state, home_state) {
        let half = round2(subtotal * SPLIT_RATE);
        (half, half, Decimal::ZERO)
    } else {
        (Decimal::ZERO, Decimal::ZERO, round2(subtotal * UNIFIED_RATE))
    };

    Totals {
        subtotal,
        cgst,
        sgst,
        igst,
        shipping,
        total: round2(subtotal + cgst + sgst + igst + shipping),
    }
}

/// Line items with their rounded amounts, as printed on the invoice.
pub fn priced_lines(items: &[LineItem]) -> Vec<PricedLine> {
    items
        .iter()
        .map(|item| PricedLine {
            name: item.name.trim().to_string(),
            qty: item.qty,
            rate: item.rate,
            amount: round2(item.qty * item.rate),
        })
        .collect()
}
