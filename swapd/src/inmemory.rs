//! In-memory test doubles for the four capability traits consumed by
//! `swap-orchestrator`.
//!
//! `swap-core`/`swap-orchestrator` ship no concrete `Sidechannel`, `LnRpc`,
//! `SolanaRpc`, or `PriceOracle` (§1/§6): those are meant to wrap a real
//! pub/sub transport, a real Lightning node, a real `solana-client`, and a
//! real price feed respectively. This module exists only so `swapd` has
//! something to run against out of the box and so the crate's integration
//! tests can exercise the full maker/taker happy path without any external
//! process. None of it is production transport or settlement; nothing here
//! touches the real Lightning network or the real Solana ledger.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use swap_core::price_guard::PriceSnapshot;
use swap_orchestrator::ln::{LnInvoiceResult, LnRpc, LnRpcError};
use swap_orchestrator::oracle::{PriceOracle, PriceOracleError};
use swap_orchestrator::transport::{Sidechannel, SidechannelMessage, TransportError};
use swap_solana::escrow::{EscrowState, EscrowStatus};
use swap_solana::rpc::{CreateEscrowResult, SolanaRpc, SolanaRpcError};
use swap_types::address::Address;
use swap_types::envelope::Envelope;
use swap_types::hexbytes::{HexBytes, PaymentHashHex, PreimageHex};
use swap_types::timestamp::UnixTimestamp;

/// A shared in-process message bus. Every [`InMemorySidechannel`] handed out
/// by [`InMemoryBus::endpoint`] sees every message sent by any other
/// endpoint, filtered down to the channels it has joined or subscribed to —
/// the same "one room per name" model the real sidechannel transport gives
/// callers (rendezvous channel plus one private channel per trade).
pub struct InMemoryBus {
    tx: broadcast::Sender<SidechannelMessage>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn endpoint(&self) -> InMemorySidechannel {
        InMemorySidechannel {
            tx: self.tx.clone(),
            rx: tokio::sync::Mutex::new(self.tx.subscribe()),
            channels: Mutex::new(HashSet::new()),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InMemorySidechannel {
    tx: broadcast::Sender<SidechannelMessage>,
    rx: tokio::sync::Mutex<broadcast::Receiver<SidechannelMessage>>,
    channels: Mutex<HashSet<String>>,
}

#[async_trait]
impl Sidechannel for InMemorySidechannel {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn join(&self, channel: &str, _invite: Option<serde_json::Value>, _welcome: Option<serde_json::Value>) -> Result<(), TransportError> {
        self.channels.lock().unwrap().insert(channel.to_string());
        Ok(())
    }

    async fn leave(&self, channel: &str) -> Result<(), TransportError> {
        self.channels.lock().unwrap().remove(channel);
        Ok(())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<(), TransportError> {
        let mut guard = self.channels.lock().unwrap();
        for c in channels {
            guard.insert(c.clone());
        }
        Ok(())
    }

    async fn send(&self, channel: &str, envelope: Envelope) -> Result<(), TransportError> {
        let msg = SidechannelMessage {
            channel: channel.to_string(),
            envelope,
        };
        self.tx.send(msg).map_err(|e| TransportError::Failed(e.to_string()))?;
        Ok(())
    }

    async fn recv(&self) -> Option<SidechannelMessage> {
        loop {
            let mut rx = self.rx.lock().await;
            match rx.recv().await {
                Ok(msg) => {
                    drop(rx);
                    if self.channels.lock().unwrap().contains(&msg.channel) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// A deterministic stand-in for a Lightning node. `invoice()` mints a fresh
/// preimage and embeds it in the returned "bolt11" string so that any
/// `StubLnRpc` instance's `pay()` can settle it without a shared ledger —
/// there is no real invoice decoding, routing, or channel balance here.
pub struct StubLnRpc;

impl StubLnRpc {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubLnRpc {
    fn default() -> Self {
        Self::new()
    }
}

const STUB_BOLT11_PREFIX: &str = "lnswapstub1";

#[async_trait]
impl LnRpc for StubLnRpc {
    async fn invoice(&self, _amount_msat: u64, _label: &str, _description: &str, expiry_sec: u64) -> Result<LnInvoiceResult, LnRpcError> {
        let preimage_bytes: [u8; 32] = rand::random();
        let preimage: PreimageHex = HexBytes(preimage_bytes);
        let mut hash_bytes = [0u8; 32];
        hash_bytes.copy_from_slice(&Sha256::digest(preimage.as_bytes()));
        let payment_hash: PaymentHashHex = HexBytes(hash_bytes);
        let bolt11 = format!("{STUB_BOLT11_PREFIX}{}{}", payment_hash.to_hex(), preimage.to_hex());
        Ok(LnInvoiceResult {
            bolt11,
            payment_hash,
            expires_at_unix: UnixTimestamp::now_secs().as_u64() + expiry_sec,
        })
    }

    async fn pay(&self, bolt11: &str) -> Result<PreimageHex, LnRpcError> {
        let rest = bolt11.strip_prefix(STUB_BOLT11_PREFIX).ok_or(LnRpcError::MalformedPreimage)?;
        if rest.len() != 128 {
            return Err(LnRpcError::MalformedPreimage);
        }
        let preimage_hex = &rest[64..];
        HexBytes::from_hex(preimage_hex).map_err(|_| LnRpcError::MalformedPreimage)
    }
}

/// A fake on-chain escrow ledger: a process-local map keyed by payment hash,
/// standing in for PDAs and token accounts on an actual Solana cluster.
pub struct StubSolanaRpc {
    escrows: Mutex<HashMap<PaymentHashHex, EscrowState>>,
}

impl StubSolanaRpc {
    pub fn new() -> Self {
        Self {
            escrows: Mutex::new(HashMap::new()),
        }
    }

    fn derive_address(seed: &[u8]) -> Address {
        let digest = Sha256::digest(seed);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Address::new(solana_pubkey::Pubkey::new_from_array(bytes))
    }
}

impl Default for StubSolanaRpc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SolanaRpc for StubSolanaRpc {
    async fn build_and_submit_create_escrow(
        &self,
        _payer: Address,
        payer_token_account: Address,
        mint: Address,
        payment_hash: PaymentHashHex,
        recipient: Address,
        refund: Address,
        refund_after_unix: u64,
        amount: u64,
    ) -> Result<CreateEscrowResult, SolanaRpcError> {
        let escrow_pda = Self::derive_address(format!("escrow:{}", payment_hash.to_hex()).as_bytes());
        let vault_ata = Self::derive_address(format!("vault:{}", payment_hash.to_hex()).as_bytes());
        let state = EscrowState {
            status: EscrowStatus::Active,
            payment_hash,
            recipient,
            refund,
            refund_after: refund_after_unix,
            mint,
            amount,
            vault: vault_ata,
            bump: 0,
        };
        self.escrows.lock().unwrap().insert(payment_hash, state);
        let _ = payer_token_account;
        Ok(CreateEscrowResult {
            tx_sig: format!("stubtx-create-{}", payment_hash.to_hex()),
            escrow_pda,
            vault_ata,
        })
    }

    async fn build_and_submit_claim_escrow(
        &self,
        recipient: Address,
        _recipient_token_account: Address,
        _mint: Address,
        payment_hash: PaymentHashHex,
        preimage: PreimageHex,
    ) -> Result<String, SolanaRpcError> {
        let digest = Sha256::digest(preimage.as_bytes());
        if digest.as_slice() != payment_hash.as_bytes() {
            return Err(SolanaRpcError::TransactionFailed("preimage does not hash to escrow payment_hash".into()));
        }
        let mut guard = self.escrows.lock().unwrap();
        let state = guard
            .get_mut(&payment_hash)
            .ok_or_else(|| SolanaRpcError::TransactionFailed("no escrow for payment_hash".into()))?;
        if state.status != EscrowStatus::Active {
            return Err(SolanaRpcError::TransactionFailed("escrow is not active".into()));
        }
        if state.recipient != recipient {
            return Err(SolanaRpcError::TransactionFailed("claimant is not the escrow recipient".into()));
        }
        state.status = EscrowStatus::Claimed;
        Ok(format!("stubtx-claim-{}", payment_hash.to_hex()))
    }

    async fn get_escrow_state(&self, payment_hash: PaymentHashHex) -> Result<Option<EscrowState>, SolanaRpcError> {
        Ok(self.escrows.lock().unwrap().get(&payment_hash).cloned())
    }

    async fn ensure_associated_token_account(&self, owner: Address, mint: Address) -> Result<Address, SolanaRpcError> {
        Ok(Self::derive_address(format!("ata:{owner}:{mint}").as_bytes()))
    }
}

/// Reports a fixed median price, as if read once from a feed at startup.
/// Real deployments should wrap an actual price feed (§6 names Pyth/an
/// aggregator) behind [`PriceOracle`] instead.
pub struct StaticPriceOracle {
    median: u64,
}

impl StaticPriceOracle {
    pub fn new(median: u64) -> Self {
        Self { median }
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn median_btc_usdt(&self) -> Result<PriceSnapshot, PriceOracleError> {
        Ok(PriceSnapshot {
            median: self.median,
            observed_at: UnixTimestamp::now_ms(),
        })
    }
}
