//! Receipt Store (C6): a `sled`-backed, local, single-process key/event
//! store. Opens one `Db` and carves out named `Tree`s for trades, the
//! payment-hash index, and per-trade event logs.

use std::path::Path;

use swap_types::hexbytes::PaymentHashHex;
use swap_types::kind::EnvelopeKind;
use swap_types::timestamp::UnixTimestamp;
use swap_types::trade::Role;

use crate::merge;
use crate::receipt::{Event, Receipt};

pub const SCHEMA_VERSION: u64 = 1;

const TRADES_TREE: &str = "trades";
const EVENTS_TREE: &str = "events";
const BY_PAYMENT_HASH_TREE: &str = "by_payment_hash";
const META_TREE: &str = "meta";
const SCHEMA_VERSION_KEY: &str = "schema_version";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Sled(#[from] sled::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("store schema version {found} is newer than this build supports ({expected})")]
    UnsupportedSchemaVersion { found: u64, expected: u64 },
    #[error("schema_version key is present but corrupt")]
    CorruptSchemaVersion,
}

/// A local, durable log of per-trade facts and ordered events (§4.6). Never
/// shared or replicated — one `ReceiptStore` per process, per §3's
/// "receipt store is process-private" rule.
pub struct ReceiptStore {
    db: sled::Db,
}

impl ReceiptStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::check_schema_version(&db)?;
        Ok(Self { db })
    }

    fn check_schema_version(db: &sled::Db) -> Result<(), StoreError> {
        let meta = db.open_tree(META_TREE)?;
        match meta.get(SCHEMA_VERSION_KEY)? {
            None => {
                meta.insert(SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_be_bytes())?;
            }
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| StoreError::CorruptSchemaVersion)?;
                let found = u64::from_be_bytes(raw);
                if found > SCHEMA_VERSION {
                    return Err(StoreError::UnsupportedSchemaVersion {
                        found,
                        expected: SCHEMA_VERSION,
                    });
                }
                if found < SCHEMA_VERSION {
                    tracing::warn!(found, expected = SCHEMA_VERSION, "migrating receipt store schema version");
                    meta.insert(SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_be_bytes())?;
                }
            }
        }
        Ok(())
    }

    fn trades(&self) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(TRADES_TREE)?)
    }

    fn events(&self) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(EVENTS_TREE)?)
    }

    fn by_payment_hash(&self) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(BY_PAYMENT_HASH_TREE)?)
    }

    /// Merge-patches the stored row for `trade_id` (creating it if absent)
    /// and returns the resulting [`Receipt`]. Missing keys in `patch` leave
    /// existing values unchanged; explicit `null`s erase them (§4.6).
    pub fn upsert_trade(&self, trade_id: &str, patch: &serde_json::Value) -> Result<Receipt, StoreError> {
        let trades = self.trades()?;
        let mut target = match trades.get(trade_id)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => merge::empty_object(),
        };
        merge::merge_patch(&mut target, patch);
        let receipt: Receipt = serde_json::from_value(target.clone())?;

        trades.insert(trade_id, serde_json::to_vec(&target)?)?;
        if let Some(payment_hash) = receipt.trade.payment_hash {
            self.by_payment_hash()?
                .insert(payment_hash.as_bytes(), trade_id.as_bytes())?;
        }
        Ok(receipt)
    }

    /// Appends an ordered, immutable event for `trade_id`. Keys are
    /// `trade_id || 0x00 || be(ts) || be(seq)` so a prefix scan on
    /// `trade_id` yields events in arrival order even when two events
    /// share a millisecond.
    pub fn append_event(&self, trade_id: &str, kind: EnvelopeKind, payload: serde_json::Value) -> Result<(), StoreError> {
        let events = self.events()?;
        let ts = UnixTimestamp::now_ms();
        let seq = self.db.generate_id()?;

        let mut key = Vec::with_capacity(trade_id.len() + 1 + 8 + 8);
        key.extend_from_slice(trade_id.as_bytes());
        key.push(0);
        key.extend_from_slice(&ts.as_u64().to_be_bytes());
        key.extend_from_slice(&seq.to_be_bytes());

        let event = Event {
            trade_id: trade_id.to_string(),
            ts,
            kind,
            payload,
        };
        events.insert(key, serde_json::to_vec(&event)?)?;
        Ok(())
    }

    pub fn events_for(&self, trade_id: &str) -> Result<Vec<Event>, StoreError> {
        let events = self.events()?;
        let mut prefix = trade_id.as_bytes().to_vec();
        prefix.push(0);
        let mut out = Vec::new();
        for entry in events.scan_prefix(prefix) {
            let (_, bytes) = entry?;
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }

    pub fn get_trade(&self, trade_id: &str) -> Result<Option<Receipt>, StoreError> {
        match self.trades()?.get(trade_id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns the most recent trade observed for `payment_hash`. Reuse of
    /// the same payment hash across trades is not detected or rejected
    /// here (spec.md §9 Open Question #3): this index just answers "what
    /// trade, if any, currently claims this hash".
    pub fn get_by_payment_hash(&self, payment_hash: PaymentHashHex) -> Result<Option<Receipt>, StoreError> {
        match self.by_payment_hash()?.get(payment_hash.as_bytes())? {
            Some(trade_id_bytes) => {
                let trade_id = String::from_utf8_lossy(&trade_id_bytes).into_owned();
                self.get_trade(&trade_id)
            }
            None => Ok(None),
        }
    }

    pub fn list_trades(&self, limit: usize) -> Result<Vec<Receipt>, StoreError> {
        let trades = self.trades()?;
        let mut out = Vec::new();
        for entry in trades.iter() {
            if out.len() >= limit {
                break;
            }
            let (_, bytes) = entry?;
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }

    /// Trades where this process is the taker, an escrow is locked, and the
    /// trade hasn't reached a terminal state — candidates to resume
    /// claiming after a restart.
    pub fn list_open_claims(&self) -> Result<Vec<Receipt>, StoreError> {
        Ok(self
            .list_trades(usize::MAX)?
            .into_iter()
            .filter(|r| r.trade.role == Role::Taker && r.trade.escrow.is_some() && !r.trade.is_terminal())
            .collect())
    }

    /// Trades where this process is the maker, an escrow is locked, and the
    /// trade hasn't reached a terminal state — candidates to resume
    /// refunding after the window passes.
    pub fn list_open_refunds(&self) -> Result<Vec<Receipt>, StoreError> {
        Ok(self
            .list_trades(usize::MAX)?
            .into_iter()
            .filter(|r| r.trade.role == Role::Maker && r.trade.escrow.is_some() && !r.trade.is_terminal())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use swap_types::hexbytes::HexBytes;
    use swap_types::trade::TradeState;

    fn temp_store() -> (ReceiptStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ReceiptStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn base_patch(trade_id: &str, role: Role) -> serde_json::Value {
        let now = UnixTimestamp::now_ms().as_u64();
        json!({
            "trade_id": trade_id,
            "role": role,
            "state": "init",
            "rfq_id": null,
            "quote_id": null,
            "terms": null,
            "terms_hash": null,
            "invoice": null,
            "payment_hash": null,
            "preimage": null,
            "escrow": null,
            "claim_tx_sig": null,
            "refund_tx_sig": null,
            "last": null,
            "accepted_at": null,
            "canceled_reason": null,
            "created_at": now,
            "updated_at": now,
            "last_error": null,
        })
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let (store, _dir) = temp_store();
        let patch = base_patch("t1", Role::Maker);
        let receipt = store.upsert_trade("t1", &patch).unwrap();
        assert_eq!(receipt.trade.trade_id, "t1");

        let fetched = store.get_trade("t1").unwrap().unwrap();
        assert_eq!(fetched.trade.trade_id, "t1");
        assert_eq!(fetched.trade.state, TradeState::Init);
    }

    #[test]
    fn upsert_patch_leaves_unlisted_fields_unchanged() {
        let (store, _dir) = temp_store();
        store.upsert_trade("t1", &base_patch("t1", Role::Maker)).unwrap();
        let receipt = store
            .upsert_trade("t1", &json!({"state": "canceled", "canceled_reason": "peer left"}))
            .unwrap();
        assert_eq!(receipt.trade.state, TradeState::Canceled);
        assert_eq!(receipt.trade.canceled_reason.as_deref(), Some("peer left"));
        assert_eq!(receipt.trade.trade_id, "t1");
    }

    #[test]
    fn get_by_payment_hash_finds_the_trade() {
        let (store, _dir) = temp_store();
        let payment_hash = HexBytes([7u8; 32]);
        let mut patch = base_patch("t1", Role::Taker);
        patch["payment_hash"] = json!(payment_hash.to_hex());
        store.upsert_trade("t1", &patch).unwrap();

        let found = store.get_by_payment_hash(payment_hash).unwrap().unwrap();
        assert_eq!(found.trade.trade_id, "t1");
    }

    #[test]
    fn append_event_then_list_in_order() {
        let (store, _dir) = temp_store();
        store.upsert_trade("t1", &base_patch("t1", Role::Maker)).unwrap();
        store
            .append_event("t1", EnvelopeKind::Terms, json!({"btc_sats": 1}))
            .unwrap();
        store
            .append_event("t1", EnvelopeKind::Cancel, json!({"reason": "x"}))
            .unwrap();
        let events = store.events_for("t1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EnvelopeKind::Terms);
        assert_eq!(events[1].kind, EnvelopeKind::Cancel);
    }

    #[test]
    fn open_claims_and_open_refunds_are_scoped_by_role() {
        let (store, _dir) = temp_store();
        let mut taker_patch = base_patch("t-taker", Role::Taker);
        taker_patch["state"] = json!("escrow");
        taker_patch["escrow"] = json!({
            "payment_hash_hex": HexBytes([1u8; 32]).to_hex(),
            "program_id": "11111111111111111111111111111111",
            "escrow_pda": "11111111111111111111111111111111",
            "vault_ata": "11111111111111111111111111111111",
            "mint": "11111111111111111111111111111111",
            "amount": "1",
            "refund_after_unix": 1,
            "recipient": "11111111111111111111111111111111",
            "refund": "11111111111111111111111111111111",
            "tx_sig": "sig",
        });
        store.upsert_trade("t-taker", &taker_patch).unwrap();

        let maker_patch = base_patch("t-maker", Role::Maker);
        store.upsert_trade("t-maker", &maker_patch).unwrap();

        let open_claims = store.list_open_claims().unwrap();
        assert_eq!(open_claims.len(), 1);
        assert_eq!(open_claims[0].trade.trade_id, "t-taker");

        let open_refunds = store.list_open_refunds().unwrap();
        assert!(open_refunds.is_empty());
    }

    #[test]
    fn rejects_a_schema_version_newer_than_this_build() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = sled::open(dir.path()).unwrap();
            let meta = db.open_tree(META_TREE).unwrap();
            meta.insert(SCHEMA_VERSION_KEY, &(SCHEMA_VERSION + 1).to_be_bytes()).unwrap();
        }
        let err = ReceiptStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedSchemaVersion { .. }));
    }
}
