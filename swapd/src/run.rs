//! `swapd` entrypoint: wires a maker and/or taker orchestrator to the
//! bundled in-memory capability implementations and runs until a shutdown
//! signal arrives.

use std::sync::Arc;

use swap_orchestrator::{MakerOrchestrator, TakerOrchestrator};
use swap_store::ReceiptStore;
use swap_types::signer::Ed25519Signer;

use crate::config::Config;
use crate::inmemory::{InMemoryBus, StaticPriceOracle, StubLnRpc, StubSolanaRpc};
use crate::sig_down::SigDown;
use crate::telemetry::Telemetry;

fn build_signer(seed_hex: Option<&str>) -> Result<Ed25519Signer, Box<dyn std::error::Error>> {
    match seed_hex {
        Some(hex_str) => {
            let bytes = hex::decode(hex_str)?;
            let seed: [u8; 32] = bytes.try_into().map_err(|_| "signer_seed_hex must decode to exactly 32 bytes")?;
            Ok(Ed25519Signer::from_bytes(&seed))
        }
        None => {
            tracing::warn!("no signer_seed_hex configured, generating an ephemeral keypair");
            Ok(Ed25519Signer::generate())
        }
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let _telemetry = Telemetry::new();

    let config = Config::load()?;
    tracing::info!(role = ?config.role, rendezvous = %config.rendezvous_channel, "starting swapd");

    let store = Arc::new(ReceiptStore::open(&config.store_path)?);
    let bus = InMemoryBus::new();
    // Maker and taker share one fake on-chain ledger so a locally-run
    // escrow is visible to both; a real `SolanaRpc` would read the same
    // cluster state regardless of who submitted the transaction.
    let solana_rpc = Arc::new(StubSolanaRpc::new());

    let sig_down = SigDown::try_new()?;
    let mut tasks = Vec::new();

    if config.role.runs_maker() {
        let peer = config.maker.clone().expect("validated by Config::load");
        let signer = build_signer(peer.signer_seed_hex.as_deref())?;
        let sidechannel = Arc::new(bus.endpoint());
        let ln_rpc = Arc::new(StubLnRpc::new());
        let price_oracle = Arc::new(StaticPriceOracle::new(config.price_median_usdt_per_btc));
        let program_id = peer.program_id.expect("validated by Config::load");
        let maker = MakerOrchestrator::new(
            signer,
            sidechannel,
            Arc::clone(&solana_rpc),
            ln_rpc,
            price_oracle,
            Arc::clone(&store),
            config.orchestrator.clone(),
            peer.sol_address,
            peer.mint,
            program_id,
            peer.token_account,
        );
        let channel = config.rendezvous_channel.clone();
        let cancel = sig_down.cancellation_token();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = maker.run(&channel, cancel).await {
                tracing::error!(error = %e, "maker orchestrator exited with error");
            }
        }));
    }

    if config.role.runs_taker() {
        let peer = config.taker.clone().expect("validated by Config::load");
        let signer = build_signer(peer.signer_seed_hex.as_deref())?;
        let sidechannel = Arc::new(bus.endpoint());
        let ln_rpc = Arc::new(StubLnRpc::new());
        let price_oracle = Arc::new(StaticPriceOracle::new(config.price_median_usdt_per_btc));
        let taker = TakerOrchestrator::new(
            signer,
            sidechannel,
            Arc::clone(&solana_rpc),
            ln_rpc,
            price_oracle,
            Arc::clone(&store),
            config.orchestrator.clone(),
            peer.sol_address,
            peer.mint,
            peer.token_account,
        );
        let channel = config.rendezvous_channel.clone();
        let cancel = sig_down.cancellation_token();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = taker.run(&channel, cancel).await {
                tracing::error!(error = %e, "taker orchestrator exited with error");
            }
        }));
    }

    if tasks.is_empty() {
        return Err("role configuration selects no orchestrator to run".into());
    }

    sig_down.recv().await;
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
