//! `swapd`: peer-to-peer BTC-Lightning / USDT-Solana atomic swap daemon.
//!
//! Wires [`swap_orchestrator::MakerOrchestrator`] and/or
//! [`swap_orchestrator::TakerOrchestrator`] to the capability
//! implementations bundled in [`swapd::inmemory`] — a demo/test
//! transport, a toy Lightning node, a toy escrow ledger, and a fixed
//! price feed — per the role selected in config. Swap the bundled
//! capability implementations for real ones to run against a real
//! counterparty.

use std::process;

#[tokio::main]
async fn main() {
    if let Err(e) = swapd::run::run().await {
        eprintln!("{e}");
        process::exit(1);
    }
}
