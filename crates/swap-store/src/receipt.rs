//! The durable projection of a trade (§3 Receipt): a [`Trade`] plus the
//! bookkeeping the store itself needs (`last_error`, for diagnosis after a
//! failed RPC or rejected transition).

use serde::{Deserialize, Serialize};
use swap_types::trade::Trade;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Receipt {
    #[serde(flatten)]
    pub trade: Trade,
    pub last_error: Option<String>,
}

impl Receipt {
    pub fn new(trade: Trade) -> Self {
        Self {
            trade,
            last_error: None,
        }
    }
}

/// An ordered entry in a trade's event log (§3 Receipt's
/// `events(trade_id, ts, kind, payload)`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub trade_id: String,
    pub ts: swap_types::timestamp::UnixTimestamp,
    pub kind: swap_types::kind::EnvelopeKind,
    pub payload: serde_json::Value,
}
