//! Configuration for the `swapd` binary (§4.11).
//!
//! `--config <path>` / `CONFIG` env var picks a JSON file (default
//! `config.json`); fields absent from the file fall back to serde
//! defaults.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use swap_orchestrator::OrchestratorConfig;
use swap_types::address::Address;

#[derive(Parser, Debug)]
#[command(name = "swapd")]
#[command(about = "Peer-to-peer BTC-Lightning / USDT-Solana atomic swap coordinator")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Which side(s) of the protocol this process runs. `Both` runs a maker and
/// a taker orchestrator in the same process over the in-memory sidechannel
/// (§4.1/§6's single-process deployment note) — useful for a local demo or
/// for the crate's own integration tests, never for two real counterparties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Maker,
    Taker,
    Both,
}

impl Role {
    pub fn runs_maker(&self) -> bool {
        matches!(self, Role::Maker | Role::Both)
    }

    pub fn runs_taker(&self) -> bool {
        matches!(self, Role::Taker | Role::Both)
    }
}

/// Per-peer identity and on-chain addressing. One of these is required for
/// each side [`Config::role`] runs.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerConfig {
    /// 64-hex-char Ed25519 seed. When absent a fresh keypair is generated
    /// at startup and logged once — fine for a demo, useless across
    /// restarts since the counterparty can no longer recognize the peer.
    #[serde(default)]
    pub signer_seed_hex: Option<String>,
    pub sol_address: Address,
    pub mint: Address,
    /// Required when this peer runs as maker (it names the escrow program
    /// in TERMS); unused for a taker-only peer.
    #[serde(default)]
    pub program_id: Option<Address>,
    /// The maker's own USDT token account (source of escrow funding) or
    /// the taker's claim-destination token account, depending on role.
    pub token_account: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_role")]
    pub role: Role,
    #[serde(default = "config_defaults::default_rendezvous_channel")]
    pub rendezvous_channel: String,
    #[serde(default = "config_defaults::default_store_path")]
    pub store_path: PathBuf,
    /// USDT (with 6 decimals, §4.3) per whole BTC, fed to the bundled
    /// [`crate::inmemory::StaticPriceOracle`]. Swap in a real feed for
    /// anything beyond a demo (§6).
    #[serde(default = "config_defaults::default_price_median")]
    pub price_median_usdt_per_btc: u64,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    pub maker: Option<PeerConfig>,
    pub taker: Option<PeerConfig>,
}

pub mod config_defaults {
    use super::Role;
    use std::path::PathBuf;

    pub fn default_role() -> Role {
        Role::Both
    }

    pub fn default_rendezvous_channel() -> String {
        "swap-rendezvous".to_string()
    }

    pub fn default_store_path() -> PathBuf {
        PathBuf::from("swapd-receipts.sled")
    }

    pub fn default_price_median() -> u64 {
        60_000_000_000
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("role {role:?} requires a [{section}] section in the config file")]
    MissingPeer { role: Role, section: &'static str },
    #[error("maker config requires program_id")]
    MissingProgramId,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config.clone(), e))?;
        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::FileRead(config_path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.role.runs_maker() {
            let maker = self.maker.as_ref().ok_or(ConfigError::MissingPeer {
                role: self.role,
                section: "maker",
            })?;
            if maker.program_id.is_none() {
                return Err(ConfigError::MissingProgramId);
            }
        }
        if self.role.runs_taker() && self.taker.is_none() {
            return Err(ConfigError::MissingPeer {
                role: self.role,
                section: "taker",
            });
        }
        Ok(())
    }
}
