//! Taker Orchestrator (C9).
//!
//! Originates RFQs, accepts the first quote that clears the price guard,
//! and settles by paying the Lightning invoice only after the Pre-Pay
//! Verifier (C5) passes. Mirrors [`crate::maker`]'s dispatcher/per-trade-
//! task split.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use swap_core::prepay;
use swap_core::price_guard;
use swap_core::transition;
use swap_solana::SolanaRpc;
use swap_store::ReceiptStore;
use swap_types::address::Address;
use swap_types::body::{self, Quote, SwapInvite};
use swap_types::envelope::Envelope;
use swap_types::hexbytes::PublicKeyHex;
use swap_types::kind::EnvelopeKind;
use swap_types::schema;
use swap_types::signer::Signer;
use swap_types::timestamp::UnixTimestamp;
use swap_types::trade::{Role, Trade, TradeState};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::ids::fresh_id;
use crate::oracle::PriceOracle;
use crate::pricing::implied_price;
use crate::sign::build_and_sign;
use crate::transport::Sidechannel;

fn trade_patch(trade: &Trade) -> serde_json::Value {
    serde_json::to_value(trade).expect("Trade always serializes")
}

fn preimage_matches(preimage: &swap_types::hexbytes::PreimageHex, payment_hash: &swap_types::hexbytes::PaymentHashHex) -> bool {
    let digest = Sha256::digest(preimage.as_bytes());
    digest.as_slice() == payment_hash.as_bytes()
}

#[derive(Debug, Clone)]
struct PendingRfq {
    rfq_id: String,
    btc_sats: u64,
    accepted_quote_id: Option<String>,
}

struct TakerHandles<Sg, Sc, Rpc, Ln> {
    signer: Arc<Sg>,
    sidechannel: Arc<Sc>,
    solana_rpc: Arc<Rpc>,
    ln_rpc: Arc<Ln>,
    store: Arc<ReceiptStore>,
    config: OrchestratorConfig,
    taker_pubkey: PublicKeyHex,
    sol_address: Address,
    mint: Address,
    recipient_token_account: Address,
}

impl<Sg, Sc, Rpc, Ln> Clone for TakerHandles<Sg, Sc, Rpc, Ln> {
    fn clone(&self) -> Self {
        Self {
            signer: Arc::clone(&self.signer),
            sidechannel: Arc::clone(&self.sidechannel),
            solana_rpc: Arc::clone(&self.solana_rpc),
            ln_rpc: Arc::clone(&self.ln_rpc),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            taker_pubkey: self.taker_pubkey,
            sol_address: self.sol_address,
            mint: self.mint,
            recipient_token_account: self.recipient_token_account,
        }
    }
}

/// Originates RFQs and settles trades on the taker side of the protocol.
pub struct TakerOrchestrator<Sg, Sc, Rpc, Ln, Px>
where
    Sg: Signer,
    Sc: Sidechannel + 'static,
    Rpc: SolanaRpc + 'static,
    Ln: crate::ln::LnRpc + 'static,
    Px: PriceOracle + 'static,
{
    handles: TakerHandles<Sg, Sc, Rpc, Ln>,
    price_oracle: Arc<Px>,
    pending: tokio::sync::Mutex<HashMap<String, PendingRfq>>,
}

impl<Sg, Sc, Rpc, Ln, Px> TakerOrchestrator<Sg, Sc, Rpc, Ln, Px>
where
    Sg: Signer + Send + Sync + 'static,
    Sc: Sidechannel + 'static,
    Rpc: SolanaRpc + 'static,
    Ln: crate::ln::LnRpc + 'static,
    Px: PriceOracle + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signer: Sg,
        sidechannel: Arc<Sc>,
        solana_rpc: Arc<Rpc>,
        ln_rpc: Arc<Ln>,
        price_oracle: Arc<Px>,
        store: Arc<ReceiptStore>,
        config: OrchestratorConfig,
        sol_address: Address,
        mint: Address,
        recipient_token_account: Address,
    ) -> Self {
        let taker_pubkey = signer.public_key();
        Self {
            handles: TakerHandles {
                signer: Arc::new(signer),
                sidechannel,
                solana_rpc,
                ln_rpc,
                store,
                config,
                taker_pubkey,
                sol_address,
                mint,
                recipient_token_account,
            },
            price_oracle,
            pending: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Originates a fresh RFQ for `btc_sats` on `rendezvous_channel` and
    /// returns the `trade_id` the caller can use to track it. Safe to call
    /// concurrently with [`Self::run`].
    pub async fn request_quote(&self, rendezvous_channel: &str, btc_sats: u64) -> Result<String, OrchestratorError> {
        let trade_id = fresh_id();
        let snapshot = self
            .price_oracle
            .median_btc_usdt()
            .await
            .map_err(|_| OrchestratorError::Timeout)?;
        let ask_amount = crate::pricing::amount_for_price(btc_sats, snapshot.median);
        let rfq_body = json!({
            "pair": body::PAIR,
            "direction": body::DIRECTION,
            "btc_sats": btc_sats,
            "usdt_amount": ask_amount.to_string(),
            "valid_until_unix": UnixTimestamp::now_secs().as_u64() + 60,
            "sol_recipient": self.handles.sol_address.to_string(),
        });
        let rfq_envelope = build_and_sign(self.handles.signer.as_ref(), EnvelopeKind::Rfq, &trade_id, rfq_body)
            .map_err(|_| OrchestratorError::Timeout)?;
        let rfq_id = rfq_envelope.content_hash();
        self.pending.lock().await.insert(
            trade_id.clone(),
            PendingRfq {
                rfq_id,
                btc_sats,
                accepted_quote_id: None,
            },
        );
        self.handles.sidechannel.send(rendezvous_channel, rfq_envelope).await?;
        Ok(trade_id)
    }

    /// Runs the negotiation dispatcher until `cancel` fires.
    pub async fn run(&self, rendezvous_channel: &str, cancel: CancellationToken) -> Result<(), OrchestratorError> {
        self.handles
            .sidechannel
            .subscribe(&[rendezvous_channel.to_string()])
            .await?;

        let mut channels: HashMap<String, mpsc::Sender<Envelope>> = HashMap::new();
        let mut tasks: JoinSet<String> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Ok(channel) = joined {
                        channels.remove(&channel);
                    }
                }
                msg = self.handles.sidechannel.recv() => {
                    let Some(msg) = msg else { break; };
                    if msg.channel == rendezvous_channel {
                        self.on_rendezvous_message(rendezvous_channel, &msg.envelope, &mut channels, &mut tasks, &cancel).await;
                    } else if let Some(tx) = channels.get(&msg.channel) {
                        let _ = tx.send(msg.envelope).await;
                    }
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    async fn on_rendezvous_message(
        &self,
        rendezvous_channel: &str,
        envelope: &Envelope,
        channels: &mut HashMap<String, mpsc::Sender<Envelope>>,
        tasks: &mut JoinSet<String>,
        cancel: &CancellationToken,
    ) {
        match envelope.kind {
            EnvelopeKind::Quote => self.on_quote(rendezvous_channel, envelope).await,
            EnvelopeKind::SwapInvite => self.on_swap_invite(envelope, channels, tasks, cancel).await,
            _ => {}
        }
    }

    async fn on_quote(&self, rendezvous_channel: &str, envelope: &Envelope) {
        if schema::validate(envelope).is_err() || envelope.verify_signature().is_err() {
            return;
        }
        let Ok(quote) = serde_json::from_value::<Quote>(envelope.body.clone()) else {
            return;
        };

        let mut pending = self.pending.lock().await;
        let Some(record) = pending.get_mut(&envelope.trade_id) else {
            return;
        };
        if record.accepted_quote_id.is_some() || record.rfq_id != quote.rfq_id {
            return;
        }
        if quote.btc_sats != record.btc_sats || quote.btc_sats < self.handles.config.rfq_min_btc_sats {
            return;
        }
        if let Some(valid_until) = quote.valid_until_unix {
            if valid_until <= UnixTimestamp::now_secs().as_u64() {
                return;
            }
        }
        let Ok(usdt_amount) = quote.usdt_amount.parse::<u64>() else {
            return;
        };
        let snapshot = match self.price_oracle.median_btc_usdt().await {
            Ok(s) => s,
            Err(_) => return,
        };
        let implied = implied_price(quote.btc_sats, usdt_amount);
        let now = UnixTimestamp::now_ms();
        if price_guard::check_taker_quote(&snapshot, implied, now, &self.handles.config.price_guard).is_err() {
            tracing::debug!(trade_id = %envelope.trade_id, "quote rejected by price guard");
            return;
        }

        let quote_id = envelope.content_hash();
        let accept_body = json!({"rfq_id": quote.rfq_id, "quote_id": quote_id});
        let accept_envelope = match build_and_sign(self.handles.signer.as_ref(), EnvelopeKind::QuoteAccept, &envelope.trade_id, accept_body) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(error = %e, "failed to sign quote_accept");
                return;
            }
        };
        if self.handles.sidechannel.send(rendezvous_channel, accept_envelope).await.is_err() {
            return;
        }
        record.accepted_quote_id = Some(quote_id);
    }

    async fn on_swap_invite(
        &self,
        envelope: &Envelope,
        channels: &mut HashMap<String, mpsc::Sender<Envelope>>,
        tasks: &mut JoinSet<String>,
        cancel: &CancellationToken,
    ) {
        if schema::validate(envelope).is_err() || envelope.verify_signature().is_err() {
            return;
        }
        let Ok(invite) = serde_json::from_value::<SwapInvite>(envelope.body.clone()) else {
            return;
        };

        let mut pending = self.pending.lock().await;
        let Some(record) = pending.get(&envelope.trade_id) else {
            return;
        };
        if record.rfq_id != invite.rfq_id || record.accepted_quote_id.as_deref() != Some(invite.quote_id.as_str()) {
            return;
        }
        let maker_pubkey = envelope.signer;
        let private_channel = invite.swap_channel.clone();
        if self.handles.sidechannel.join(&private_channel, None, None).await.is_err() {
            return;
        }

        let (tx, rx) = mpsc::channel(32);
        channels.insert(private_channel.clone(), tx);
        pending.remove(&envelope.trade_id);
        drop(pending);

        let handles = self.handles.clone();
        let trade_id = envelope.trade_id.clone();
        let channel = private_channel.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(e) = run_taker_trade(handles, trade_id.clone(), maker_pubkey, channel.clone(), rx, cancel).await {
                tracing::warn!(trade_id = %trade_id, error = %e, "taker trade ended");
            }
            channel
        });
    }
}

async fn run_taker_trade<Sg, Sc, Rpc, Ln>(
    handles: TakerHandles<Sg, Sc, Rpc, Ln>,
    trade_id: String,
    maker_pubkey: PublicKeyHex,
    private_channel: String,
    mut rx: mpsc::Receiver<Envelope>,
    cancel: CancellationToken,
) -> Result<(), OrchestratorError>
where
    Sg: Signer + Send + Sync + 'static,
    Sc: Sidechannel + 'static,
    Rpc: SolanaRpc + 'static,
    Ln: crate::ln::LnRpc + 'static,
{
    let mut trade = Trade::new(&trade_id, Role::Taker);
    let mut sent: HashMap<EnvelopeKind, Envelope> = HashMap::new();
    let deadline = Instant::now() + Duration::from_secs(handles.config.swap_timeout_sec);
    let mut resend = tokio::time::interval(Duration::from_millis(handles.config.resend_ms));
    let _ = maker_pubkey;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                maybe_cancel(&handles, &trade_id, &private_channel, &trade).await;
                return Err(OrchestratorError::Canceled);
            }
            _ = tokio::time::sleep_until(deadline), if !past_escrow(&trade) => {
                maybe_cancel(&handles, &trade_id, &private_channel, &trade).await;
                return Err(OrchestratorError::Timeout);
            }
            _ = resend.tick() => {
                resend_if_due(&handles, &private_channel, &trade, &sent).await;
            }
            incoming = rx.recv() => {
                let Some(envelope) = incoming else { return Ok(()); };
                match handle_taker_incoming(&handles, &mut trade, &private_channel, &mut sent, envelope).await {
                    Ok(done) if done => return Ok(()),
                    Ok(_) => {}
                    Err(e) => tracing::debug!(trade_id = %trade_id, error = %e, "dropping invalid incoming envelope or settlement failure"),
                }
            }
        }
    }
}

fn past_escrow(trade: &Trade) -> bool {
    matches!(
        trade.state,
        TradeState::Escrow | TradeState::LnPaid | TradeState::Claimed | TradeState::Refunded | TradeState::Canceled
    )
}

async fn maybe_cancel<Sg, Sc, Rpc, Ln>(handles: &TakerHandles<Sg, Sc, Rpc, Ln>, trade_id: &str, channel: &str, trade: &Trade)
where
    Sg: Signer,
    Sc: Sidechannel,
{
    if !past_escrow(trade) {
        let cancel_body = json!({"reason": "timeout"});
        if let Ok(envelope) = build_and_sign(handles.signer.as_ref(), EnvelopeKind::Cancel, trade_id, cancel_body) {
            let _ = handles.sidechannel.send(channel, envelope).await;
        }
    }
}

async fn resend_if_due<Sg, Sc, Rpc, Ln>(
    handles: &TakerHandles<Sg, Sc, Rpc, Ln>,
    channel: &str,
    trade: &Trade,
    sent: &HashMap<EnvelopeKind, Envelope>,
) where
    Sc: Sidechannel,
{
    if trade.state == TradeState::Accepted {
        if let Some(e) = sent.get(&EnvelopeKind::Accept) {
            let _ = handles.sidechannel.send(channel, e.clone()).await;
        }
    }
}

/// Returns `Ok(true)` once the trade reaches a terminal state and the task
/// should exit.
async fn handle_taker_incoming<Sg, Sc, Rpc, Ln>(
    handles: &TakerHandles<Sg, Sc, Rpc, Ln>,
    trade: &mut Trade,
    private_channel: &str,
    sent: &mut HashMap<EnvelopeKind, Envelope>,
    envelope: Envelope,
) -> Result<bool, OrchestratorError>
where
    Sg: Signer,
    Sc: Sidechannel,
    Rpc: SolanaRpc,
    Ln: crate::ln::LnRpc,
{
    match envelope.kind {
        EnvelopeKind::Terms => {
            let next = transition::apply(trade, &envelope)?;
            *trade = next;
            handles.store.upsert_trade(&trade.trade_id, &trade_patch(trade))?;
            handles.store.append_event(&trade.trade_id, EnvelopeKind::Terms, envelope.body.clone())?;

            let terms = trade.terms.clone().expect("terms set by apply_terms");
            if terms.sol_recipient != handles.sol_address {
                tracing::warn!(trade_id = %trade.trade_id, "terms names a sol_recipient that is not us, abandoning trade");
                return Ok(false);
            }
            if sent.contains_key(&EnvelopeKind::Accept) {
                return Ok(false);
            }
            let terms_hash = trade.terms_hash.clone().expect("terms_hash set by apply_terms");
            let accept_body = json!({"terms_hash": terms_hash});
            let accept_envelope = build_and_sign(handles.signer.as_ref(), EnvelopeKind::Accept, &trade.trade_id, accept_body)
                .map_err(|_| OrchestratorError::Timeout)?;
            *trade = transition::apply(trade, &accept_envelope)?;
            handles.store.upsert_trade(&trade.trade_id, &trade_patch(trade))?;
            handles
                .store
                .append_event(&trade.trade_id, EnvelopeKind::Accept, accept_envelope.body.clone())?;
            handles.sidechannel.send(private_channel, accept_envelope.clone()).await?;
            sent.insert(EnvelopeKind::Accept, accept_envelope);
            Ok(false)
        }
        EnvelopeKind::LnInvoice => {
            let next = transition::apply(trade, &envelope)?;
            *trade = next;
            handles.store.upsert_trade(&trade.trade_id, &trade_patch(trade))?;
            handles.store.append_event(&trade.trade_id, EnvelopeKind::LnInvoice, envelope.body.clone())?;
            try_pay(handles, trade, private_channel, sent).await?;
            Ok(false)
        }
        EnvelopeKind::SolEscrowCreated => {
            let next = transition::apply(trade, &envelope)?;
            *trade = next;
            handles.store.upsert_trade(&trade.trade_id, &trade_patch(trade))?;
            handles
                .store
                .append_event(&trade.trade_id, EnvelopeKind::SolEscrowCreated, envelope.body.clone())?;
            try_pay(handles, trade, private_channel, sent).await?;
            Ok(false)
        }
        EnvelopeKind::Cancel => {
            let next = transition::apply(trade, &envelope)?;
            *trade = next;
            handles.store.upsert_trade(&trade.trade_id, &trade_patch(trade))?;
            handles.store.append_event(&trade.trade_id, EnvelopeKind::Cancel, envelope.body.clone())?;
            Ok(true)
        }
        EnvelopeKind::Status => {
            transition::apply(trade, &envelope)?;
            Ok(false)
        }
        _ => Ok(false),
    }
}

/// Once both the invoice and escrow are known, runs the Pre-Pay Verifier
/// and, on success, pays and claims. A no-op if either leg is still
/// missing or payment has already been dispatched.
async fn try_pay<Sg, Sc, Rpc, Ln>(
    handles: &TakerHandles<Sg, Sc, Rpc, Ln>,
    trade: &mut Trade,
    private_channel: &str,
    sent: &mut HashMap<EnvelopeKind, Envelope>,
) -> Result<(), OrchestratorError>
where
    Sg: Signer,
    Sc: Sidechannel,
    Rpc: SolanaRpc,
    Ln: crate::ln::LnRpc,
{
    if sent.contains_key(&EnvelopeKind::LnPaid) {
        return Ok(());
    }
    let (Some(terms), Some(invoice), Some(escrow)) = (trade.terms.clone(), trade.invoice.clone(), trade.escrow.clone()) else {
        return Ok(());
    };

    let now = UnixTimestamp::now_secs();
    prepay::verify(&terms, &invoice, &escrow, now, handles.solana_rpc.as_ref(), &handles.config.prepay).await?;

    let preimage = handles.ln_rpc.pay(&invoice.bolt11).await?;
    if !preimage_matches(&preimage, &invoice.payment_hash_hex) {
        return Err(OrchestratorError::PrePay(swap_core::prepay::PrePayError::CrossFieldMismatch(
            "preimage does not hash to payment_hash",
        )));
    }

    let paid_body = json!({
        "payment_hash_hex": invoice.payment_hash_hex.to_hex(),
        "preimage_hex": preimage.to_hex(),
    });
    let paid_envelope = build_and_sign(handles.signer.as_ref(), EnvelopeKind::LnPaid, &trade.trade_id, paid_body)
        .map_err(|_| OrchestratorError::Timeout)?;
    *trade = transition::apply(trade, &paid_envelope)?;
    handles.store.upsert_trade(&trade.trade_id, &trade_patch(trade))?;
    handles
        .store
        .append_event(&trade.trade_id, EnvelopeKind::LnPaid, paid_envelope.body.clone())?;
    handles.sidechannel.send(private_channel, paid_envelope.clone()).await?;
    sent.insert(EnvelopeKind::LnPaid, paid_envelope);

    let tx_sig = handles
        .solana_rpc
        .build_and_submit_claim_escrow(
            handles.sol_address,
            handles.recipient_token_account,
            handles.mint,
            invoice.payment_hash_hex,
            preimage,
        )
        .await?;
    let claimed_body = json!({
        "payment_hash_hex": invoice.payment_hash_hex.to_hex(),
        "escrow_pda": escrow.escrow_pda.to_string(),
        "tx_sig": tx_sig,
    });
    let claimed_envelope = build_and_sign(handles.signer.as_ref(), EnvelopeKind::SolClaimed, &trade.trade_id, claimed_body)
        .map_err(|_| OrchestratorError::Timeout)?;
    *trade = transition::apply(trade, &claimed_envelope)?;
    handles.store.upsert_trade(&trade.trade_id, &trade_patch(trade))?;
    handles
        .store
        .append_event(&trade.trade_id, EnvelopeKind::SolClaimed, claimed_envelope.body.clone())?;
    handles.sidechannel.send(private_channel, claimed_envelope.clone()).await?;
    sent.insert(EnvelopeKind::SolClaimed, claimed_envelope.clone());

    for _ in 0..handles.config.claim_rebroadcast_attempts {
        tokio::time::sleep(Duration::from_millis(handles.config.claim_rebroadcast_cooldown_ms)).await;
        let _ = handles.sidechannel.send(private_channel, claimed_envelope.clone()).await;
    }

    Ok(())
}
