//! Maker Orchestrator (C8).
//!
//! Owns a rendezvous subscription and, per matched RFQ, a per-trade task.
//! Negotiation (RFQ -> QUOTE -> QUOTE_ACCEPT -> SWAP_INVITE) happens
//! inline in the dispatcher loop; settlement (TERMS -> ... -> CLAIMED)
//! runs in a spawned task per trade, tracked in a `JoinSet` so shutdown
//! can await their completion (§5). Every external capability (transport,
//! Lightning node, chain RPC, price feed) is injected as a trait object so
//! the orchestrator itself stays free of any concrete integration.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use swap_core::price_guard;
use swap_core::transition::{self, TransitionError};
use swap_solana::SolanaRpc;
use swap_store::ReceiptStore;
use swap_types::address::Address;
use swap_types::body::{QuoteAccept, Rfq, Terms};
use swap_types::envelope::Envelope;
use swap_types::hexbytes::PublicKeyHex;
use swap_types::kind::EnvelopeKind;
use swap_types::schema;
use swap_types::signer::Signer;
use swap_types::timestamp::UnixTimestamp;
use swap_types::trade::{Role, Trade, TradeState};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::oracle::PriceOracle;
use crate::pricing::{amount_for_price, apply_spread_bps};
use crate::sign::build_and_sign;
use crate::transport::Sidechannel;

fn trade_patch(trade: &Trade) -> serde_json::Value {
    serde_json::to_value(trade).expect("Trade always serializes")
}

#[derive(Debug, Clone)]
struct QuoteRecord {
    trade_id: String,
    btc_sats: u64,
    usdt_amount: String,
    sol_recipient: Address,
}

struct MakerHandles<Sg, Sc, Rpc, Ln> {
    signer: Arc<Sg>,
    sidechannel: Arc<Sc>,
    solana_rpc: Arc<Rpc>,
    ln_rpc: Arc<Ln>,
    store: Arc<ReceiptStore>,
    config: OrchestratorConfig,
    maker_pubkey: PublicKeyHex,
    sol_address: Address,
    mint: Address,
    program_id: Address,
    payer_token_account: Address,
}

impl<Sg, Sc, Rpc, Ln> Clone for MakerHandles<Sg, Sc, Rpc, Ln> {
    fn clone(&self) -> Self {
        Self {
            signer: Arc::clone(&self.signer),
            sidechannel: Arc::clone(&self.sidechannel),
            solana_rpc: Arc::clone(&self.solana_rpc),
            ln_rpc: Arc::clone(&self.ln_rpc),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            maker_pubkey: self.maker_pubkey,
            sol_address: self.sol_address,
            mint: self.mint,
            program_id: self.program_id,
            payer_token_account: self.payer_token_account,
        }
    }
}

/// Negotiates and settles trades on the maker side of the protocol.
pub struct MakerOrchestrator<Sg, Sc, Rpc, Ln, Px>
where
    Sg: Signer,
    Sc: Sidechannel + 'static,
    Rpc: SolanaRpc + 'static,
    Ln: crate::ln::LnRpc + 'static,
    Px: PriceOracle + 'static,
{
    handles: MakerHandles<Sg, Sc, Rpc, Ln>,
    price_oracle: Arc<Px>,
}

impl<Sg, Sc, Rpc, Ln, Px> MakerOrchestrator<Sg, Sc, Rpc, Ln, Px>
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
        program_id: Address,
        payer_token_account: Address,
    ) -> Self {
        let maker_pubkey = signer.public_key();
        Self {
            handles: MakerHandles {
                signer: Arc::new(signer),
                sidechannel,
                solana_rpc,
                ln_rpc,
                store,
                config,
                maker_pubkey,
                sol_address,
                mint,
                program_id,
                payer_token_account,
            },
            price_oracle,
        }
    }

    /// Runs the negotiation dispatcher until `cancel` fires. Settlement of
    /// each matched trade runs in its own spawned task.
    pub async fn run(&self, rendezvous_channel: &str, cancel: CancellationToken) -> Result<(), OrchestratorError> {
        self.handles
            .sidechannel
            .subscribe(&[rendezvous_channel.to_string()])
            .await?;

        let mut quotes: HashMap<String, QuoteRecord> = HashMap::new();
        let mut channels: HashMap<String, mpsc::Sender<Envelope>> = HashMap::new();
        let mut tasks: JoinSet<String> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Ok(channel) = joined {
                        channels.remove(&channel);
                    }
                }
                msg = self.handles.sidechannel.recv() => {
                    let Some(msg) = msg else { break; };
                    if msg.channel == rendezvous_channel {
                        self.on_rendezvous_message(rendezvous_channel, &msg.envelope, &mut quotes, &mut channels, &mut tasks, &cancel).await;
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
        quotes: &mut HashMap<String, QuoteRecord>,
        channels: &mut HashMap<String, mpsc::Sender<Envelope>>,
        tasks: &mut JoinSet<String>,
        cancel: &CancellationToken,
    ) {
        match envelope.kind {
            EnvelopeKind::Rfq => self.on_rfq(rendezvous_channel, envelope, quotes).await,
            EnvelopeKind::QuoteAccept => {
                self.on_quote_accept(rendezvous_channel, envelope, quotes, channels, tasks, cancel)
                    .await
            }
            _ => {}
        }
    }

    async fn on_rfq(&self, rendezvous_channel: &str, envelope: &Envelope, quotes: &mut HashMap<String, QuoteRecord>) {
        if schema::validate(envelope).is_err() || envelope.verify_signature().is_err() {
            return;
        }
        let Ok(rfq) = serde_json::from_value::<Rfq>(envelope.body.clone()) else {
            return;
        };
        let Some(sol_recipient) = rfq.sol_recipient else {
            tracing::debug!(trade_id = %envelope.trade_id, "rfq without sol_recipient; maker cannot quote");
            return;
        };

        let snapshot = match self.price_oracle.median_btc_usdt().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "price oracle unavailable, skipping rfq");
                return;
            }
        };
        let now = UnixTimestamp::now_ms();
        let maker_price = apply_spread_bps(snapshot.median, self.handles.config.spread_bps);
        if price_guard::check_maker_overpay(&snapshot, maker_price, now, &self.handles.config.price_guard).is_err() {
            tracing::debug!(trade_id = %envelope.trade_id, "rfq rejected by price guard");
            return;
        }
        let usdt_amount = amount_for_price(rfq.btc_sats, maker_price);

        let rfq_id = envelope.content_hash();
        let quote_body = json!({
            "rfq_id": rfq_id,
            "btc_sats": rfq.btc_sats,
            "usdt_amount": usdt_amount.to_string(),
            "valid_until_unix": now.as_u64() / 1000 + 60,
        });
        let quote_envelope = match build_and_sign(self.handles.signer.as_ref(), EnvelopeKind::Quote, &envelope.trade_id, quote_body) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(error = %e, "failed to sign quote");
                return;
            }
        };
        let quote_id = quote_envelope.content_hash();
        if self.handles.sidechannel.send(rendezvous_channel, quote_envelope).await.is_err() {
            return;
        }
        quotes.insert(
            quote_id,
            QuoteRecord {
                trade_id: envelope.trade_id.clone(),
                btc_sats: rfq.btc_sats,
                usdt_amount: usdt_amount.to_string(),
                sol_recipient,
            },
        );
    }

    async fn on_quote_accept(
        &self,
        rendezvous_channel: &str,
        envelope: &Envelope,
        quotes: &mut HashMap<String, QuoteRecord>,
        channels: &mut HashMap<String, mpsc::Sender<Envelope>>,
        tasks: &mut JoinSet<String>,
        cancel: &CancellationToken,
    ) {
        if schema::validate(envelope).is_err() || envelope.verify_signature().is_err() {
            return;
        }
        let Ok(quote_accept) = serde_json::from_value::<QuoteAccept>(envelope.body.clone()) else {
            return;
        };
        let Some(record) = quotes.remove(&quote_accept.quote_id) else {
            tracing::debug!(quote_id = %quote_accept.quote_id, "quote_accept for unknown quote");
            return;
        };
        if record.trade_id != envelope.trade_id {
            return;
        }
        let taker_pubkey = envelope.signer;
        let private_channel = format!("trade-{}", record.trade_id);

        let invite = json!({"channel": private_channel});
        let welcome = json!({"channel": private_channel});
        let invite_body = json!({
            "rfq_id": quote_accept.rfq_id,
            "quote_id": quote_accept.quote_id,
            "swap_channel": private_channel,
            "owner_pubkey": self.handles.maker_pubkey.to_hex(),
            "invite": invite.clone(),
            "welcome": welcome.clone(),
        });
        let invite_envelope = match build_and_sign(self.handles.signer.as_ref(), EnvelopeKind::SwapInvite, &record.trade_id, invite_body) {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(error = %e, "failed to sign swap_invite");
                return;
            }
        };
        if self.handles.sidechannel.send(rendezvous_channel, invite_envelope).await.is_err() {
            return;
        }
        if self.handles.sidechannel.join(&private_channel, Some(invite), Some(welcome)).await.is_err() {
            return;
        }

        let (tx, rx) = mpsc::channel(32);
        channels.insert(private_channel.clone(), tx);

        let handles = self.handles.clone();
        let trade_id = record.trade_id.clone();
        let channel = private_channel.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(e) = run_maker_trade(handles, trade_id.clone(), taker_pubkey, record, channel.clone(), rx, cancel).await {
                tracing::warn!(trade_id = %trade_id, error = %e, "maker trade ended");
            }
            channel
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_maker_trade<Sg, Sc, Rpc, Ln>(
    handles: MakerHandles<Sg, Sc, Rpc, Ln>,
    trade_id: String,
    taker_pubkey: PublicKeyHex,
    record: QuoteRecord,
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
    let mut trade = Trade::new(&trade_id, Role::Maker);
    let mut sent: HashMap<EnvelopeKind, Envelope> = HashMap::new();
    let deadline = Instant::now() + Duration::from_secs(handles.config.swap_timeout_sec);
    let mut resend = tokio::time::interval(Duration::from_millis(handles.config.resend_ms));

    let now_unix = UnixTimestamp::now_secs();
    let terms_body = json!({
        "btc_sats": record.btc_sats,
        "usdt_amount": record.usdt_amount,
        "usdt_decimals": 6,
        "sol_mint": handles.mint.to_string(),
        "sol_recipient": record.sol_recipient.to_string(),
        "sol_refund": handles.sol_address.to_string(),
        "sol_refund_after_unix": now_unix.as_u64() + handles.config.sol_refund_window_secs,
        "ln_receiver_peer": handles.maker_pubkey.to_hex(),
        "ln_payer_peer": taker_pubkey.to_hex(),
        "terms_valid_until_unix": now_unix.as_u64() + handles.config.swap_timeout_sec,
    });
    let terms_envelope = build_and_sign(handles.signer.as_ref(), EnvelopeKind::Terms, &trade_id, terms_body)
        .map_err(|_| OrchestratorError::Timeout)?;
    trade = transition::apply(&trade, &terms_envelope)?;
    handles.store.upsert_trade(&trade_id, &trade_patch(&trade))?;
    handles
        .store
        .append_event(&trade_id, EnvelopeKind::Terms, terms_envelope.body.clone())?;
    handles.sidechannel.send(&private_channel, terms_envelope.clone()).await?;
    sent.insert(EnvelopeKind::Terms, terms_envelope);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if !matches!(trade.state, TradeState::Escrow | TradeState::LnPaid | TradeState::Claimed | TradeState::Refunded | TradeState::Canceled) {
                    let cancel_body = json!({"reason": "canceled"});
                    if let Ok(envelope) = build_and_sign(handles.signer.as_ref(), EnvelopeKind::Cancel, &trade_id, cancel_body) {
                        let _ = handles.sidechannel.send(&private_channel, envelope).await;
                    }
                }
                return Err(OrchestratorError::Canceled);
            }
            _ = tokio::time::sleep_until(deadline), if !past_escrow(&trade) => {
                let cancel_body = json!({"reason": "swap timeout"});
                if let Ok(envelope) = build_and_sign(handles.signer.as_ref(), EnvelopeKind::Cancel, &trade_id, cancel_body) {
                    if let Ok(next) = transition::apply(&trade, &envelope) {
                        trade = next;
                        let _ = handles.store.upsert_trade(&trade_id, &trade_patch(&trade));
                        let _ = handles.sidechannel.send(&private_channel, envelope).await;
                    }
                }
                return Err(OrchestratorError::Timeout);
            }
            _ = resend.tick() => {
                resend_if_due(&handles, &private_channel, &trade, &sent).await;
            }
            incoming = rx.recv() => {
                let Some(envelope) = incoming else { return Ok(()); };
                match handle_maker_incoming(&handles, &mut trade, &record, &private_channel, &mut sent, envelope).await {
                    Ok(done) if done => return Ok(()),
                    Ok(_) => {}
                    Err(e) => tracing::debug!(trade_id = %trade_id, error = %e, "dropping invalid incoming envelope"),
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

async fn resend_if_due<Sg, Sc, Rpc, Ln>(
    handles: &MakerHandles<Sg, Sc, Rpc, Ln>,
    channel: &str,
    trade: &Trade,
    sent: &HashMap<EnvelopeKind, Envelope>,
) where
    Sc: Sidechannel,
    Rpc: SolanaRpc,
    Ln: crate::ln::LnRpc,
{
    match trade.state {
        TradeState::Terms => {
            if let Some(e) = sent.get(&EnvelopeKind::Terms) {
                let _ = handles.sidechannel.send(channel, e.clone()).await;
            }
        }
        TradeState::Invoice | TradeState::Escrow => {
            if let Some(e) = sent.get(&EnvelopeKind::SolEscrowCreated).or_else(|| sent.get(&EnvelopeKind::LnInvoice)) {
                let _ = handles.sidechannel.send(channel, e.clone()).await;
            }
        }
        _ => {}
    }
}

/// Returns `Ok(true)` once the trade reaches a terminal state and the task
/// should exit.
async fn handle_maker_incoming<Sg, Sc, Rpc, Ln>(
    handles: &MakerHandles<Sg, Sc, Rpc, Ln>,
    trade: &mut Trade,
    record: &QuoteRecord,
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
        EnvelopeKind::Accept => {
            let next = transition::apply(trade, &envelope)?;
            *trade = next;
            handles.store.upsert_trade(&trade.trade_id, &trade_patch(trade))?;
            handles.store.append_event(&trade.trade_id, EnvelopeKind::Accept, envelope.body.clone())?;

            let terms = trade.terms.clone().ok_or(TransitionError::CrossFieldMismatch("terms not yet known"))?;
            issue_invoice_and_escrow(handles, trade, record, &terms, private_channel, sent).await?;
            Ok(false)
        }
        EnvelopeKind::SolClaimed => {
            let next = transition::apply(trade, &envelope)?;
            *trade = next;
            handles.store.upsert_trade(&trade.trade_id, &trade_patch(trade))?;
            handles.store.append_event(&trade.trade_id, EnvelopeKind::SolClaimed, envelope.body.clone())?;
            tracing::info!(trade_id = %trade.trade_id, "trade claimed");
            Ok(true)
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

async fn issue_invoice_and_escrow<Sg, Sc, Rpc, Ln>(
    handles: &MakerHandles<Sg, Sc, Rpc, Ln>,
    trade: &mut Trade,
    record: &QuoteRecord,
    terms: &Terms,
    private_channel: &str,
    sent: &mut HashMap<EnvelopeKind, Envelope>,
) -> Result<(), OrchestratorError>
where
    Sg: Signer,
    Sc: Sidechannel,
    Rpc: SolanaRpc,
    Ln: crate::ln::LnRpc,
{
    let amount_msat = record.btc_sats.saturating_mul(1000);
    let invoice = handles
        .ln_rpc
        .invoice(amount_msat, &trade.trade_id, "atomic swap", 3600)
        .await?;
    let invoice_body = json!({
        "bolt11": invoice.bolt11,
        "payment_hash_hex": invoice.payment_hash.to_hex(),
        "amount_msat": amount_msat.to_string(),
        "expires_at_unix": invoice.expires_at_unix,
    });
    let invoice_envelope = build_and_sign(handles.signer.as_ref(), EnvelopeKind::LnInvoice, &trade.trade_id, invoice_body)
        .map_err(|_| OrchestratorError::Timeout)?;
    *trade = transition::apply(trade, &invoice_envelope)?;
    handles.store.upsert_trade(&trade.trade_id, &trade_patch(trade))?;
    handles
        .store
        .append_event(&trade.trade_id, EnvelopeKind::LnInvoice, invoice_envelope.body.clone())?;
    handles.sidechannel.send(private_channel, invoice_envelope.clone()).await?;
    sent.insert(EnvelopeKind::LnInvoice, invoice_envelope);

    let amount: u64 = terms.usdt_amount.parse().unwrap_or(0);
    let escrow = handles
        .solana_rpc
        .build_and_submit_create_escrow(
            handles.sol_address,
            handles.payer_token_account,
            handles.mint,
            invoice.payment_hash,
            record.sol_recipient,
            handles.sol_address,
            terms.sol_refund_after_unix,
            amount,
        )
        .await?;
    let escrow_body = json!({
        "payment_hash_hex": invoice.payment_hash.to_hex(),
        "program_id": handles.program_id.to_string(),
        "escrow_pda": escrow.escrow_pda.to_string(),
        "vault_ata": escrow.vault_ata.to_string(),
        "mint": handles.mint.to_string(),
        "amount": terms.usdt_amount,
        "refund_after_unix": terms.sol_refund_after_unix,
        "recipient": record.sol_recipient.to_string(),
        "refund": handles.sol_address.to_string(),
        "tx_sig": escrow.tx_sig,
    });
    let escrow_envelope = build_and_sign(handles.signer.as_ref(), EnvelopeKind::SolEscrowCreated, &trade.trade_id, escrow_body)
        .map_err(|_| OrchestratorError::Timeout)?;
    *trade = transition::apply(trade, &escrow_envelope)?;
    handles.store.upsert_trade(&trade.trade_id, &trade_patch(trade))?;
    handles
        .store
        .append_event(&trade.trade_id, EnvelopeKind::SolEscrowCreated, escrow_envelope.body.clone())?;
    handles.sidechannel.send(private_channel, escrow_envelope.clone()).await?;
    sent.insert(EnvelopeKind::SolEscrowCreated, escrow_envelope);

    Ok(())
}
