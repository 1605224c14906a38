//! # Node Configuration
//!
//! Typed configuration for every worker, built from the raw [`Cli`] values.
//!
//! ## Validation Rules
//!
//! - Exactly one auth method must be configured
//! - Contract addresses are 20-byte hex
//! - Endpoints parse as URLs with the scheme their transport expects
//! - `epoch_length` and `evm_reader_max_fetch_size` are positive
//!
//! Secrets are held in [`Redacted`], so `NodeConfig` may be logged with
//! `{:?}`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use rollups_telemetry::TelemetryConfig;
use shared_l1::{BlockTag, RetryPolicy};
use shared_types::{parse_address, Address};
use thiserror::Error;

use super::cli::Cli;

// =============================================================================
// SECRETS
// =============================================================================

/// A value that never shows up in `Debug` or `Display` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Redacted<T>(T);

impl<T> Redacted<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Endpoint values are left out of the message since they may carry
    /// credentials.
    #[error("invalid {name}: {reason}")]
    InvalidEndpoint { name: &'static str, reason: String },

    #[error("invalid {name} {value:?}: expected a 20-byte hex address")]
    InvalidAddress { name: &'static str, value: String },

    #[error("invalid default block {0:?}: expected finalized, safe or latest")]
    InvalidDefaultBlock(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("no auth method configured")]
    MissingAuth,

    #[error("exactly one auth method may be configured, found: {}", .0.join(", "))]
    ConflictingAuth(Vec<&'static str>),

    #[error("auth method {0} is incomplete: {1}")]
    IncompleteAuth(&'static str, &'static str),
}

// =============================================================================
// NODE CONFIG
// =============================================================================

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Logging and the `/metrics` server.
    pub telemetry: TelemetryConfig,
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub input_box: InputBoxConfig,
    /// Epoch length in blocks.
    pub epoch_length: u64,
    pub polling: PollingConfig,
    pub reader: ReaderFetchConfig,
    pub auth: AuthConfig,
    pub machine: MachineConfig,
    pub features: FeatureConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub endpoint: Redacted<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub http_endpoint: String,
    /// New-head subscription; the reader falls back to polling without it.
    pub ws_endpoint: Option<String>,
    pub chain_id: u64,
    pub default_block: BlockTag,
    /// Blocks subtracted from the head when `default_block` is `latest`.
    pub finality_offset: u64,
    /// Per-request timeout of the JSON-RPC client.
    pub block_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct InputBoxConfig {
    pub address: Address,
    pub deployment_block: u64,
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub evm_reader: Duration,
    pub advancer: Duration,
    pub validator: Duration,
    pub claimer: Duration,
}

#[derive(Debug, Clone)]
pub struct ReaderFetchConfig {
    pub max_retries: u64,
    pub max_delay: Duration,
    pub max_fetch_size: u64,
}

impl ReaderFetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.max_delay)
    }
}

/// The key that signs claim submissions.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    PrivateKey(Redacted<String>),
    PrivateKeyFile(PathBuf),
    Mnemonic {
        phrase: Redacted<String>,
        account_index: u32,
    },
    MnemonicFile {
        path: PathBuf,
        account_index: u32,
    },
    AwsKms {
        key_id: String,
        region: String,
    },
}

impl AuthConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthConfig::PrivateKey(_) => "private_key",
            AuthConfig::PrivateKeyFile(_) => "private_key_file",
            AuthConfig::Mnemonic { .. } => "mnemonic",
            AuthConfig::MnemonicFile { .. } => "mnemonic_file",
            AuthConfig::AwsKms { .. } => "aws_kms",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FeatureConfig {
    pub claimer_enabled: bool,
    pub machine_hash_check_enabled: bool,
}

impl NodeConfig {
    /// Validate raw command-line values.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if cli.epoch_length == 0 {
            return Err(ConfigError::Zero("epoch_length"));
        }
        if cli.evm_reader_max_fetch_size == 0 {
            return Err(ConfigError::Zero("evm_reader_max_fetch_size"));
        }

        check_endpoint("postgres_endpoint", &cli.postgres_endpoint, &["postgres", "postgresql"])?;
        check_endpoint(
            "blockchain_http_endpoint",
            &cli.blockchain_http_endpoint,
            &["http", "https"],
        )?;
        if let Some(ws) = &cli.blockchain_ws_endpoint {
            check_endpoint("blockchain_ws_endpoint", ws, &["ws", "wss"])?;
        }
        check_endpoint(
            "machine_server_endpoint",
            &cli.machine_server_endpoint,
            &["http", "https"],
        )?;

        let auth = auth_from_cli(&cli)?;

        Ok(Self {
            telemetry: TelemetryConfig {
                log_level: cli.log_level,
                log_pretty: cli.log_pretty,
                http_address: cli.http_address,
            },
            database: DatabaseConfig {
                endpoint: Redacted::new(cli.postgres_endpoint),
                max_connections: cli.postgres_max_connections,
            },
            chain: ChainConfig {
                http_endpoint: cli.blockchain_http_endpoint,
                ws_endpoint: cli.blockchain_ws_endpoint,
                chain_id: cli.blockchain_id,
                default_block: parse_default_block(&cli.blockchain_default_block)?,
                finality_offset: cli.blockchain_finality_offset,
                block_timeout: cli.blockchain_block_timeout,
            },
            input_box: InputBoxConfig {
                address: address_field("inputbox_address", &cli.inputbox_address)?,
                deployment_block: cli.inputbox_deployment_block,
            },
            epoch_length: cli.epoch_length,
            polling: PollingConfig {
                evm_reader: cli.evm_reader_polling_interval,
                advancer: cli.advancer_polling_interval,
                validator: cli.validator_polling_interval,
                claimer: cli.claimer_polling_interval,
            },
            reader: ReaderFetchConfig {
                max_retries: cli.evm_reader_retry_max_retries,
                max_delay: cli.evm_reader_retry_max_delay,
                max_fetch_size: cli.evm_reader_max_fetch_size,
            },
            auth,
            machine: MachineConfig {
                endpoint: cli.machine_server_endpoint,
                timeout: cli.machine_server_timeout,
            },
            features: FeatureConfig {
                claimer_enabled: cli.feature_claimer_enabled,
                machine_hash_check_enabled: cli.feature_machine_hash_check_enabled,
            },
        })
    }
}

fn check_endpoint(name: &'static str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidEndpoint {
        name,
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidEndpoint {
            name,
            reason: format!(
                "scheme {:?} is not one of {}",
                url.scheme(),
                schemes.join(", ")
            ),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEndpoint {
            name,
            reason: "missing host".to_string(),
        });
    }
    Ok(())
}

fn address_field(name: &'static str, value: &str) -> Result<Address, ConfigError> {
    parse_address(value).map_err(|_| ConfigError::InvalidAddress {
        name,
        value: value.to_string(),
    })
}

fn parse_default_block(value: &str) -> Result<BlockTag, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "finalized" => Ok(BlockTag::Finalized),
        "safe" => Ok(BlockTag::Safe),
        "latest" => Ok(BlockTag::Latest),
        _ => Err(ConfigError::InvalidDefaultBlock(value.to_string())),
    }
}

fn auth_from_cli(cli: &Cli) -> Result<AuthConfig, ConfigError> {
    let kms_given = cli.auth_aws_kms_key_id.is_some() || cli.auth_aws_kms_region.is_some();
    let given: Vec<&'static str> = [
        ("private_key", cli.auth_private_key.is_some()),
        ("private_key_file", cli.auth_private_key_file.is_some()),
        ("mnemonic", cli.auth_mnemonic.is_some()),
        ("mnemonic_file", cli.auth_mnemonic_file.is_some()),
        ("aws_kms", kms_given),
    ]
    .into_iter()
    .filter_map(|(name, present)| present.then_some(name))
    .collect();

    if given.len() > 1 {
        return Err(ConfigError::ConflictingAuth(given));
    }

    if let Some(key) = &cli.auth_private_key {
        return Ok(AuthConfig::PrivateKey(Redacted::new(key.clone())));
    }
    if let Some(path) = &cli.auth_private_key_file {
        return Ok(AuthConfig::PrivateKeyFile(path.clone()));
    }
    if let Some(phrase) = &cli.auth_mnemonic {
        return Ok(AuthConfig::Mnemonic {
            phrase: Redacted::new(phrase.clone()),
            account_index: cli.auth_mnemonic_account_index,
        });
    }
    if let Some(path) = &cli.auth_mnemonic_file {
        return Ok(AuthConfig::MnemonicFile {
            path: path.clone(),
            account_index: cli.auth_mnemonic_account_index,
        });
    }
    match (&cli.auth_aws_kms_key_id, &cli.auth_aws_kms_region) {
        (Some(key_id), Some(region)) => Ok(AuthConfig::AwsKms {
            key_id: key_id.clone(),
            region: region.clone(),
        }),
        (Some(_), None) => Err(ConfigError::IncompleteAuth("aws_kms", "region is missing")),
        (None, Some(_)) => Err(ConfigError::IncompleteAuth("aws_kms", "key id is missing")),
        (None, None) => Err(ConfigError::MissingAuth),
    }
}
