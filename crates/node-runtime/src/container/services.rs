//! # Service Container
//!
//! Owns the infrastructure every worker shares: the repository, the L1
//! client, the machine transport, the signer and the metrics registry.
//!
//! ## Startup Checks
//!
//! 1. Database schema version equals [`SCHEMA_VERSION`](rn_01_repository::SCHEMA_VERSION)
//! 2. The L1 node reports the configured chain id
//! 3. Every running application's on-chain template hash equals the local one

use std::sync::Arc;
use std::time::Duration;

use rn_01_repository::{PostgresRepository, Repository, RepositoryError};
use rn_02_signer::{AwsKmsClient, Signer, SignerError};
use rn_04_advancer::{MachineError, Machines, RemoteMachines};
use rollups_telemetry::Metrics;
use shared_l1::{ApplicationContract, EthClient, HttpEthClient, L1Error};
use shared_types::{to_hex, Address, Hash};
use thiserror::Error;
use tracing::info;

use super::config::{AuthConfig, NodeConfig};

const DATABASE_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Fatal errors while bringing the node up.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    L1(#[from] L1Error),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error("L1 node is on chain {actual}, configured for {expected}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error(
        "template hash of {} is {} on chain, {} locally",
        to_hex(.app),
        to_hex(.onchain),
        to_hex(.local)
    )]
    TemplateHashMismatch {
        app: Address,
        local: Hash,
        onchain: Hash,
    },
}

impl StartupError {
    /// Stable name for the `error_kind` log field.
    pub fn error_kind(&self) -> &'static str {
        match self {
            StartupError::Repository(e) => e.error_kind(),
            StartupError::L1(e) => e.error_kind(),
            StartupError::Signer(e) => e.error_kind(),
            StartupError::Machine(e) => e.error_kind(),
            StartupError::ChainIdMismatch { .. } => "chain_id_mismatch",
            StartupError::TemplateHashMismatch { .. } => "template_hash_mismatch",
        }
    }
}

/// Shared infrastructure handed to the workers.
pub struct ServiceContainer {
    pub config: NodeConfig,
    pub repo: Arc<dyn Repository>,
    pub client: Arc<dyn EthClient>,
    pub machines: Arc<dyn Machines>,
    /// Present only when the claimer is enabled.
    pub signer: Option<Arc<Signer>>,
    pub metrics: Metrics,
}

impl ServiceContainer {
    /// Connect the production adapters and run the startup checks.
    pub async fn connect(config: NodeConfig, metrics: Metrics) -> Result<Self, StartupError> {
        let repo = PostgresRepository::connect(
            config.database.endpoint.expose(),
            config.database.max_connections,
            DATABASE_ACQUIRE_TIMEOUT,
        )
        .await?;
        repo.check_schema_version().await?;

        let client: Arc<dyn EthClient> = Arc::new(HttpEthClient::new(
            config.chain.http_endpoint.clone(),
            config.chain.block_timeout,
        )?);

        let apps: Vec<Address> = repo
            .get_all_running_applications()
            .await?
            .iter()
            .map(|app| app.contract_address)
            .collect();
        let machines = RemoteMachines::new(
            config.machine.endpoint.clone(),
            apps,
            config.machine.timeout,
        )?;

        let signer = if config.features.claimer_enabled {
            Some(Arc::new(build_signer(&config.auth).await?))
        } else {
            None
        };

        let container = Self {
            config,
            repo: Arc::new(repo),
            client,
            machines: Arc::new(machines),
            signer,
            metrics,
        };
        container.verify_chain().await?;
        Ok(container)
    }

    /// Chain id and template hash checks.
    pub async fn verify_chain(&self) -> Result<(), StartupError> {
        let expected = self.config.chain.chain_id;
        let actual = self.client.chain_id().await?;
        if actual != expected {
            return Err(StartupError::ChainIdMismatch { expected, actual });
        }

        let retry = self.config.reader.retry_policy();
        let apps = self.repo.get_all_running_applications().await?;
        for app in &apps {
            let contract = ApplicationContract::new(
                app.contract_address,
                Arc::clone(&self.client),
                retry,
            );
            let onchain = contract.template_hash().await?;
            if onchain != app.template_hash {
                return Err(StartupError::TemplateHashMismatch {
                    app: app.contract_address,
                    local: app.template_hash,
                    onchain,
                });
            }
        }

        info!(
            chain_id = actual,
            apps = apps.len(),
            "Chain and application templates verified"
        );
        Ok(())
    }
}

/// Build the signer the auth settings select.
pub async fn build_signer(auth: &AuthConfig) -> Result<Signer, SignerError> {
    let signer = match auth {
        AuthConfig::PrivateKey(key) => Signer::from_private_key(key.expose())?,
        AuthConfig::PrivateKeyFile(path) => Signer::from_private_key_file(path)?,
        AuthConfig::Mnemonic {
            phrase,
            account_index,
        } => Signer::from_mnemonic(phrase.expose(), *account_index)?,
        AuthConfig::MnemonicFile {
            path,
            account_index,
        } => Signer::from_mnemonic_file(path, *account_index)?,
        AuthConfig::AwsKms { key_id, region } => {
            let client = AwsKmsClient::from_env(region.clone())?;
            Signer::remote_kms(Arc::new(client), key_id.clone()).await?
        }
    };
    info!(
        auth = auth.kind(),
        address = %to_hex(&signer.address()),
        "Signer ready"
    );
    Ok(signer)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::container::config::Redacted;
    use crate::container::Cli;
    use clap::Parser;
    use rn_01_repository::InMemoryRepository;
    use rn_04_advancer::MockMachine;
    use shared_l1::MockEthClient;
    use shared_types::Application;

    pub const HARDHAT_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    pub const APP: Address = [0xaa; 20];
    pub const TEMPLATE: Hash = [0x7e; 32];

    pub fn test_config() -> NodeConfig {
        let cli = Cli::try_parse_from([
            "rollups-node",
            "--postgres-endpoint",
            "postgres://localhost/rollups",
            "--blockchain-http-endpoint",
            "http://localhost:8545",
            "--blockchain-id",
            "31337",
            "--inputbox-address",
            "0x593E5BCf894D6829Dd26D0810DA7F064406aebB6",
            "--inputbox-deployment-block",
            "16",
            "--epoch-length",
            "5",
            "--machine-server-endpoint",
            "http://localhost:10001",
            "--auth-private-key",
            HARDHAT_KEY,
            "--http-address",
            "127.0.0.1:0",
            "--evm-reader-retry-max-retries",
            "0",
            "--evm-reader-polling-interval",
            "20ms",
            "--advancer-polling-interval",
            "20ms",
            "--validator-polling-interval",
            "20ms",
            "--claimer-polling-interval",
            "20ms",
        ])
        .unwrap();
        NodeConfig::from_cli(cli).unwrap()
    }

    /// A container over in-memory adapters with one registered application.
    pub async fn mock_container(chain: Arc<MockEthClient>) -> ServiceContainer {
        let repo = InMemoryRepository::new();
        repo.insert_application(&Application::new(APP, TEMPLATE, [0xcc; 20]))
            .await
            .unwrap();
        chain.set_template_hash(APP, TEMPLATE);
        let config = test_config();
        set_onchain_input_count(&chain, &config, 0);
        let signer = build_signer(&config.auth).await.unwrap();
        ServiceContainer {
            config,
            repo: Arc::new(repo),
            client: chain,
            machines: Arc::new(MockMachine::new(vec![APP])),
            signer: Some(Arc::new(signer)),
            metrics: Metrics::new().unwrap(),
        }
    }

    pub fn set_onchain_input_count(chain: &MockEthClient, config: &NodeConfig, count: u64) {
        chain.set_number_of_inputs(config.input_box.address, count);
    }

    #[tokio::test]
    async fn test_verify_chain_accepts_matching_node() {
        let container = mock_container(Arc::new(MockEthClient::new())).await;
        container.verify_chain().await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_chain_rejects_other_chain() {
        let container = mock_container(Arc::new(MockEthClient::new().with_chain_id(1))).await;
        let err = container.verify_chain().await.unwrap_err();
        assert!(matches!(
            err,
            StartupError::ChainIdMismatch {
                expected: 31337,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_verify_chain_rejects_other_template() {
        let chain = Arc::new(MockEthClient::new());
        let container = mock_container(Arc::clone(&chain)).await;
        chain.set_template_hash(APP, [0x01; 32]);

        let err = container.verify_chain().await.unwrap_err();
        assert_eq!(err.error_kind(), "template_hash_mismatch");
    }

    #[tokio::test]
    async fn test_signer_from_mnemonic() {
        let auth = AuthConfig::Mnemonic {
            phrase: Redacted::new(
                "test test test test test test test test test test test junk".to_string(),
            ),
            account_index: 0,
        };
        let signer = build_signer(&auth).await.unwrap();
        let from_key = build_signer(&AuthConfig::PrivateKey(Redacted::new(HARDHAT_KEY.into())))
            .await
            .unwrap();
        assert_eq!(signer.address(), from_key.address());
    }
}
