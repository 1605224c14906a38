//! # Command Line
//!
//! Raw settings as the operator supplies them. Every flag can also come from
//! a `ROLLUPS_*` environment variable. Nothing here is validated beyond
//! primitive parsing; see [`NodeConfig::from_cli`](super::NodeConfig::from_cli).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

/// Holds secrets in the clear; convert to `NodeConfig` before logging anything.
#[derive(Clone, Parser)]
#[command(
    name = "rollups-node",
    version,
    about = "Off-chain workers of a rollups node",
    args_override_self = true
)]
pub struct Cli {
    // ===== LOGGING =====
    #[arg(long, env = "ROLLUPS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "ROLLUPS_LOG_PRETTY", default_value_t = false, action = ArgAction::Set)]
    pub log_pretty: bool,

    #[arg(long, env = "ROLLUPS_HTTP_ADDRESS", default_value = "127.0.0.1:10000")]
    pub http_address: SocketAddr,

    // ===== DATABASE =====
    #[arg(long, env = "ROLLUPS_POSTGRES_ENDPOINT", hide_env_values = true)]
    pub postgres_endpoint: String,

    #[arg(long, env = "ROLLUPS_POSTGRES_MAX_CONNECTIONS", default_value_t = 10)]
    pub postgres_max_connections: u32,

    // ===== L1 CHAIN =====
    #[arg(long, env = "ROLLUPS_BLOCKCHAIN_HTTP_ENDPOINT")]
    pub blockchain_http_endpoint: String,

    #[arg(long, env = "ROLLUPS_BLOCKCHAIN_WS_ENDPOINT")]
    pub blockchain_ws_endpoint: Option<String>,

    #[arg(long, env = "ROLLUPS_BLOCKCHAIN_ID")]
    pub blockchain_id: u64,

    /// `finalized`, `safe` or `latest`.
    #[arg(long, env = "ROLLUPS_BLOCKCHAIN_DEFAULT_BLOCK", default_value = "finalized")]
    pub blockchain_default_block: String,

    #[arg(long, env = "ROLLUPS_BLOCKCHAIN_FINALITY_OFFSET", default_value_t = 10)]
    pub blockchain_finality_offset: u64,

    #[arg(long, env = "ROLLUPS_BLOCKCHAIN_BLOCK_TIMEOUT", default_value = "60s", value_parser = humantime::parse_duration)]
    pub blockchain_block_timeout: Duration,

    // ===== INPUT BOX =====
    #[arg(long, env = "ROLLUPS_INPUTBOX_ADDRESS")]
    pub inputbox_address: String,

    #[arg(long, env = "ROLLUPS_INPUTBOX_DEPLOYMENT_BLOCK")]
    pub inputbox_deployment_block: u64,

    // ===== EPOCHS =====
    #[arg(long, env = "ROLLUPS_EPOCH_LENGTH")]
    pub epoch_length: u64,

    // ===== POLLING =====
    #[arg(long, env = "ROLLUPS_EVM_READER_POLLING_INTERVAL", default_value = "7s", value_parser = humantime::parse_duration)]
    pub evm_reader_polling_interval: Duration,

    #[arg(long, env = "ROLLUPS_ADVANCER_POLLING_INTERVAL", default_value = "3s", value_parser = humantime::parse_duration)]
    pub advancer_polling_interval: Duration,

    #[arg(long, env = "ROLLUPS_VALIDATOR_POLLING_INTERVAL", default_value = "3s", value_parser = humantime::parse_duration)]
    pub validator_polling_interval: Duration,

    #[arg(long, env = "ROLLUPS_CLAIMER_POLLING_INTERVAL", default_value = "3s", value_parser = humantime::parse_duration)]
    pub claimer_polling_interval: Duration,

    // ===== L1 RETRY AND FETCH =====
    #[arg(long, env = "ROLLUPS_EVM_READER_RETRY_MAX_RETRIES", default_value_t = 3)]
    pub evm_reader_retry_max_retries: u64,

    #[arg(long, env = "ROLLUPS_EVM_READER_RETRY_MAX_DELAY", default_value = "3s", value_parser = humantime::parse_duration)]
    pub evm_reader_retry_max_delay: Duration,

    #[arg(long, env = "ROLLUPS_EVM_READER_MAX_FETCH_SIZE", default_value_t = 10_000)]
    pub evm_reader_max_fetch_size: u64,

    // ===== AUTH =====
    #[arg(long, env = "ROLLUPS_AUTH_PRIVATE_KEY", hide_env_values = true)]
    pub auth_private_key: Option<String>,

    #[arg(long, env = "ROLLUPS_AUTH_PRIVATE_KEY_FILE")]
    pub auth_private_key_file: Option<PathBuf>,

    #[arg(long, env = "ROLLUPS_AUTH_MNEMONIC", hide_env_values = true)]
    pub auth_mnemonic: Option<String>,

    #[arg(long, env = "ROLLUPS_AUTH_MNEMONIC_FILE")]
    pub auth_mnemonic_file: Option<PathBuf>,

    #[arg(long, env = "ROLLUPS_AUTH_MNEMONIC_ACCOUNT_INDEX", default_value_t = 0)]
    pub auth_mnemonic_account_index: u32,

    #[arg(long, env = "ROLLUPS_AUTH_AWS_KMS_KEY_ID")]
    pub auth_aws_kms_key_id: Option<String>,

    #[arg(long, env = "ROLLUPS_AUTH_AWS_KMS_REGION")]
    pub auth_aws_kms_region: Option<String>,

    // ===== MACHINE SERVER =====
    #[arg(long, env = "ROLLUPS_MACHINE_SERVER_ENDPOINT")]
    pub machine_server_endpoint: String,

    #[arg(long, env = "ROLLUPS_MACHINE_SERVER_TIMEOUT", default_value = "60s", value_parser = humantime::parse_duration)]
    pub machine_server_timeout: Duration,

    // ===== FEATURES =====
    #[arg(long, env = "ROLLUPS_FEATURE_CLAIMER_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub feature_claimer_enabled: bool,

    #[arg(long, env = "ROLLUPS_FEATURE_MACHINE_HASH_CHECK_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub feature_machine_hash_check_enabled: bool,
}
