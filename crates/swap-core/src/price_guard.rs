//! Price Guard (C7).
//!
//! Rejects RFQs/quotes whose implied price deviates from a recent oracle
//! median beyond a configurable tolerance, in exact integer basis-point
//! arithmetic — no floating point anywhere near a money comparison.

use serde::{Deserialize, Serialize};
use swap_types::timestamp::UnixTimestamp;

const BPS_SCALE: i128 = 10_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PriceGuardError {
    #[error("price snapshot is older than the age budget")]
    StaleSnapshot,
    #[error("price snapshot median must be positive")]
    InvalidMedian,
    #[error("quote discount of {bps} bps exceeds the {max} bps ceiling")]
    DiscountTooHigh { bps: i64, max: i64 },
    #[error("quote overpay of {bps} bps exceeds the {max} bps ceiling")]
    OverpayTooHigh { bps: i64, max: i64 },
}

/// A recent price observation from the embedded price oracle (§6
/// `priceGet`), scoped to one pair.
#[derive(Debug, Clone, Copy)]
pub struct PriceSnapshot {
    /// The oracle's median price, scaled consistently with `implied` (the
    /// scale itself is opaque to the guard — only the ratio matters).
    pub median: u64,
    pub observed_at: UnixTimestamp,
}

impl PriceSnapshot {
    pub fn age_ms(&self, now: UnixTimestamp) -> u64 {
        now.as_u64().saturating_sub(self.observed_at.as_u64())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceGuardConfig {
    pub max_age_ms: u64,
    pub max_discount_bps: i64,
    pub max_overpay_bps: i64,
}

/// Exact-integer basis-point deviation of `implied` below `median`:
/// `(1 - implied/median) * 10000`, positive when `implied` is cheaper than
/// the oracle median (good for the taker, a discount from the maker).
fn discount_bps(median: u64, implied: u64) -> i128 {
    ((median as i128 - implied as i128) * BPS_SCALE) / median as i128
}

fn check_snapshot(snapshot: &PriceSnapshot, now: UnixTimestamp, config: &PriceGuardConfig) -> Result<(), PriceGuardError> {
    if snapshot.age_ms(now) > config.max_age_ms {
        return Err(PriceGuardError::StaleSnapshot);
    }
    if snapshot.median == 0 {
        return Err(PriceGuardError::InvalidMedian);
    }
    Ok(())
}

/// Taker-side check: rejects a quote whose implied price is *more expensive*
/// than the oracle median by more than `max_discount_bps` — i.e. the quote's
/// apparent discount relative to the mid is implausibly large, a sign of a
/// stale or manipulated quote. Also rejects a quote cheaper than the median
/// beyond the same ceiling, on the theory that "too good to be true" quotes
/// are as suspicious as "too expensive" ones (spec.md §4.7's single
/// `discount_bps` ceiling governs both directions for the taker).
pub fn check_taker_quote(
    snapshot: &PriceSnapshot,
    implied: u64,
    now: UnixTimestamp,
    config: &PriceGuardConfig,
) -> Result<(), PriceGuardError> {
    check_snapshot(snapshot, now, config)?;
    let bps = discount_bps(snapshot.median, implied).abs();
    if bps > config.max_discount_bps as i128 {
        return Err(PriceGuardError::DiscountTooHigh {
            bps: bps as i64,
            max: config.max_discount_bps,
        });
    }
    Ok(())
}

/// Maker-side check: rejects an RFQ whose implied price would force the
/// maker to overpay (give more USDT per sat than the oracle median plus
/// `max_overpay_bps`).
pub fn check_maker_overpay(
    snapshot: &PriceSnapshot,
    implied: u64,
    now: UnixTimestamp,
    config: &PriceGuardConfig,
) -> Result<(), PriceGuardError> {
    check_snapshot(snapshot, now, config)?;
    let overpay = -discount_bps(snapshot.median, implied);
    if overpay > config.max_overpay_bps as i128 {
        return Err(PriceGuardError::OverpayTooHigh {
            bps: overpay as i64,
            max: config.max_overpay_bps,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PriceGuardConfig {
        PriceGuardConfig {
            max_age_ms: 60_000,
            max_discount_bps: 100,
            max_overpay_bps: 100,
        }
    }

    fn fresh_snapshot(median: u64, now: UnixTimestamp) -> PriceSnapshot {
        PriceSnapshot { median, observed_at: now }
    }

    #[test]
    fn exact_match_passes() {
        let now = UnixTimestamp::from(1_000);
        let snapshot = fresh_snapshot(100, now);
        assert!(check_taker_quote(&snapshot, 100, now, &config()).is_ok());
    }

    #[test]
    fn small_discount_within_tolerance_passes() {
        let now = UnixTimestamp::from(1_000);
        let snapshot = fresh_snapshot(10_000, now);
        assert!(check_taker_quote(&snapshot, 10_050, now, &config()).is_ok());
    }

    #[test]
    fn large_deviation_is_rejected() {
        let now = UnixTimestamp::from(1_000);
        let snapshot = fresh_snapshot(10_000, now);
        let err = check_taker_quote(&snapshot, 5_000, now, &config()).unwrap_err();
        assert!(matches!(err, PriceGuardError::DiscountTooHigh { .. }));
    }

    #[test]
    fn stale_snapshot_is_rejected() {
        let observed_at = UnixTimestamp::from(0);
        let now = UnixTimestamp::from(120_000);
        let snapshot = PriceSnapshot { median: 100, observed_at };
        let err = check_taker_quote(&snapshot, 100, now, &config()).unwrap_err();
        assert_eq!(err, PriceGuardError::StaleSnapshot);
    }

    #[test]
    fn zero_median_is_rejected() {
        let now = UnixTimestamp::from(1_000);
        let snapshot = fresh_snapshot(0, now);
        let err = check_taker_quote(&snapshot, 1, now, &config()).unwrap_err();
        assert_eq!(err, PriceGuardError::InvalidMedian);
    }

    #[test]
    fn maker_overpay_beyond_ceiling_is_rejected() {
        let now = UnixTimestamp::from(1_000);
        let snapshot = fresh_snapshot(10_000, now);
        let err = check_maker_overpay(&snapshot, 10_200, now, &config()).unwrap_err();
        assert!(matches!(err, PriceGuardError::OverpayTooHigh { .. }));
    }
}
