// =============================================================================
// Grid Geometry — trigger price for a given layer index
// =============================================================================
//
// A layer's trigger price is the cumulative sum of every row's `gap` from
// index 0 up to and including the target layer, applied against the session
// anchor — never chained from the previous layer's own trigger price. Buy
// layers step down from the anchor, sell layers step up.
// =============================================================================

use crate::settings::GridRow;
use crate::types::Side;

/// Compute the trigger price for layer `target_index`, given the ordered row
/// table and the session's anchor price.
///
/// Returns `None` if `target_index` is out of range or any row up to and
/// including it is malformed (non-positive gap).
pub fn trigger_price(side: Side, anchor: f64, rows: &[GridRow], target_index: u32) -> Option<f64> {
    let mut cumulative_gap = 0.0;
    let mut found = false;

    for row in rows {
        if row.gap <= 0.0 {
            return None;
        }
        cumulative_gap += row.gap;
        if row.index == target_index {
            found = true;
            break;
        }
    }

    if !found {
        return None;
    }

    Some(match side {
        Side::Buy => anchor - cumulative_gap,
        Side::Sell => anchor + cumulative_gap,
    })
}
