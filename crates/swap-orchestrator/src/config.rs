//! Orchestrator-level tuning knobs. Loaded as part of `swapd`'s JSON
//! config (§4.11); defaults here exist purely for tests.

use serde::{Deserialize, Serialize};
use swap_core::prepay::PrePayVerifierConfig;
use swap_core::price_guard::PriceGuardConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maker-side margin applied on top of the oracle median when quoting
    /// (§4.8: "compute `quote_usdt_amount` from the oracle with a
    /// configurable `spread_bps`").
    pub spread_bps: i64,
    pub price_guard: PriceGuardConfig,
    pub prepay: PrePayVerifierConfig,
    /// Resend cooldown for TERMS/LN_INVOICE/SOL_ESCROW_CREATED (§4.8).
    pub resend_ms: u64,
    /// Global per-trade timeout (§4.8/§4.9).
    pub swap_timeout_sec: u64,
    /// How far past escrow creation the maker sets `sol_refund_after_unix`
    /// (§4.8).
    pub sol_refund_window_secs: u64,
    /// RFQ size floor a taker-side quote must clear (§4.9).
    pub rfq_min_btc_sats: u64,
    /// Best-effort SOL_CLAIMED rebroadcast count to cover peer-exit races
    /// (§4.9).
    pub claim_rebroadcast_attempts: u32,
    pub claim_rebroadcast_cooldown_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            spread_bps: 25,
            price_guard: PriceGuardConfig {
                max_age_ms: 30_000,
                max_discount_bps: 150,
                max_overpay_bps: 150,
            },
            prepay: PrePayVerifierConfig::default(),
            resend_ms: 5_000,
            swap_timeout_sec: 900,
            sol_refund_window_secs: 3_600,
            rfq_min_btc_sats: 10_000,
            claim_rebroadcast_attempts: 3,
            claim_rebroadcast_cooldown_ms: 2_000,
        }
    }
}
