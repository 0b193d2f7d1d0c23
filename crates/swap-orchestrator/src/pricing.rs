//! Integer price convention shared by both orchestrators: a price is USDT
//! base units per whole BTC (1e8 sats). Every conversion below is exact
//! integer math, matching C7's "no floating point near money" rule.

const SATS_PER_BTC: u128 = 100_000_000;

pub(crate) fn implied_price(btc_sats: u64, usdt_amount_base_units: u64) -> u64 {
    ((usdt_amount_base_units as u128) * SATS_PER_BTC / (btc_sats.max(1) as u128)) as u64
}

pub(crate) fn amount_for_price(btc_sats: u64, price_per_btc: u64) -> u64 {
    ((btc_sats as u128) * (price_per_btc as u128) / SATS_PER_BTC) as u64
}

/// Widens `median_price` in the maker's favor by `spread_bps`.
pub(crate) fn apply_spread_bps(median_price: u64, spread_bps: i64) -> u64 {
    let adjusted = (median_price as i128) * (10_000 + spread_bps as i128) / 10_000;
    adjusted.max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implied_price_round_trips_amount_for_price() {
        let price = 7_000_000_000u64;
        let btc_sats = 123_456u64;
        let amount = amount_for_price(btc_sats, price);
        let back = implied_price(btc_sats, amount);
        // Integer division loses at most a rounding unit.
        assert!(back.abs_diff(price) < 1000);
    }

    #[test]
    fn spread_widens_the_price_upward() {
        assert!(apply_spread_bps(10_000, 25) > 10_000);
        assert_eq!(apply_spread_bps(10_000, 0), 10_000);
    }
}
