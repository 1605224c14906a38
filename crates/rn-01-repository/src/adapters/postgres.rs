//! # PostgreSQL Repository
//!
//! Production adapter over a `sqlx` connection pool. Every trait method runs
//! in at most one transaction. Writes that depend on per-application
//! counters (input and output indices) first take the application row with
//! `FOR UPDATE`, so concurrent writers on one application serialize.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use shared_types::{
    AdvanceResult, Address, Application, ComputedClaim, Epoch, EpochInputs, EpochStatus, Hash,
    Input, InputCompletionStatus, Output, Report,
};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row};
use tracing::{debug, info};

use crate::domain::errors::RepositoryError;
use crate::domain::rules;
use crate::ports::inbound::{Repository, SCHEMA_VERSION};

/// DDL for a fresh database at [`SCHEMA_VERSION`].
pub const SCHEMA: &str = include_str!("../../schema/schema.sql");

const APPLICATION_COLUMNS: &str = "a.id, a.contract_address, a.template_hash, \
     a.iconsensus_address, a.last_processed_block, a.last_claim_check_block, \
     a.last_output_check_block, a.status";

const EPOCH_COLUMNS: &str = r#"e.id, a.contract_address, e."index", e.first_block,
     e.last_block, e.claim_hash, e.transaction_hash, e.status"#;

const INPUT_COLUMNS: &str = r#"i.id, a.contract_address, i."index", i.epoch_id,
     i.block_number, i.raw_data, i.status, i.outputs_hash, i.machine_hash,
     i.transaction_reference"#;

const OUTPUT_COLUMNS: &str = r#"o.id, o.input_id, o."index", o.raw_data, o.hash,
     o.output_hashes_siblings, o.transaction_hash"#;

/// Statuses at or past `processed_all_inputs`.
const PROCESSED_STATUSES: &str =
    "('processed_all_inputs', 'claim_computed', 'claim_submitted', 'claim_accepted')";

// =============================================================================
// VALUE CONVERSION
// =============================================================================

fn to_db(value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("{value} exceeds BIGINT")))
}

fn from_db(value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("negative value {value}")))
}

fn fixed<const N: usize>(bytes: Vec<u8>) -> Result<[u8; N], RepositoryError> {
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| RepositoryError::Corrupt(format!("expected {N} bytes, found {actual}")))
}

fn fixed_opt<const N: usize>(bytes: Option<Vec<u8>>) -> Result<Option<[u8; N]>, RepositoryError> {
    bytes.map(fixed::<N>).transpose()
}

fn application_from_row(row: &PgRow) -> Result<Application, RepositoryError> {
    Ok(Application {
        id: from_db(row.try_get("id")?)?,
        contract_address: fixed(row.try_get("contract_address")?)?,
        template_hash: fixed(row.try_get("template_hash")?)?,
        iconsensus_address: fixed(row.try_get("iconsensus_address")?)?,
        last_processed_block: from_db(row.try_get("last_processed_block")?)?,
        last_claim_check_block: from_db(row.try_get("last_claim_check_block")?)?,
        last_output_check_block: from_db(row.try_get("last_output_check_block")?)?,
        status: row.try_get::<String, _>("status")?.parse()?,
    })
}

fn epoch_from_row(row: &PgRow) -> Result<Epoch, RepositoryError> {
    Ok(Epoch {
        id: from_db(row.try_get("id")?)?,
        application_address: fixed(row.try_get("contract_address")?)?,
        index: from_db(row.try_get("index")?)?,
        first_block: from_db(row.try_get("first_block")?)?,
        last_block: from_db(row.try_get("last_block")?)?,
        claim_hash: fixed_opt(row.try_get("claim_hash")?)?,
        transaction_hash: fixed_opt(row.try_get("transaction_hash")?)?,
        status: row.try_get::<String, _>("status")?.parse()?,
    })
}

fn input_from_row(row: &PgRow) -> Result<Input, RepositoryError> {
    Ok(Input {
        id: from_db(row.try_get("id")?)?,
        application_address: fixed(row.try_get("contract_address")?)?,
        index: from_db(row.try_get("index")?)?,
        epoch_id: from_db(row.try_get("epoch_id")?)?,
        block_number: from_db(row.try_get("block_number")?)?,
        raw_data: row.try_get("raw_data")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        outputs_hash: fixed_opt(row.try_get("outputs_hash")?)?,
        machine_hash: fixed_opt(row.try_get("machine_hash")?)?,
        transaction_reference: fixed(row.try_get("transaction_reference")?)?,
    })
}

fn output_from_row(row: &PgRow) -> Result<Output, RepositoryError> {
    let siblings: Vec<Vec<u8>> = row.try_get("output_hashes_siblings")?;
    Ok(Output {
        id: from_db(row.try_get("id")?)?,
        input_id: from_db(row.try_get("input_id")?)?,
        index: from_db(row.try_get("index")?)?,
        raw_data: row.try_get("raw_data")?,
        hash: fixed_opt(row.try_get("hash")?)?,
        output_hashes_siblings: siblings
            .into_iter()
            .map(fixed::<32>)
            .collect::<Result<_, _>>()?,
        transaction_hash: fixed_opt(row.try_get("transaction_hash")?)?,
    })
}

fn report_from_row(row: &PgRow) -> Result<Report, RepositoryError> {
    Ok(Report {
        id: from_db(row.try_get("id")?)?,
        input_id: from_db(row.try_get("input_id")?)?,
        index: from_db(row.try_get("index")?)?,
        raw_data: row.try_get("raw_data")?,
    })
}

fn collect<T>(
    rows: Vec<PgRow>,
    map: fn(&PgRow) -> Result<T, RepositoryError>,
) -> Result<Vec<T>, RepositoryError> {
    rows.iter().map(map).collect()
}

// =============================================================================
// ROW LOCKS
// =============================================================================

/// Lock the application row; returns `(id, last_processed_block)`.
async fn lock_application(
    conn: &mut PgConnection,
    app: Address,
) -> Result<(i64, u64), RepositoryError> {
    let row = sqlx::query::<Postgres>(
        "SELECT id, last_processed_block FROM application \
         WHERE contract_address = $1 FOR UPDATE",
    )
    .bind(&app[..])
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(RepositoryError::ApplicationNotFound(app))?;
    Ok((row.try_get("id")?, from_db(row.try_get("last_processed_block")?)?))
}

/// Lock an epoch row; returns its status.
async fn lock_epoch(conn: &mut PgConnection, epoch_id: u64) -> Result<EpochStatus, RepositoryError> {
    let status: String = sqlx::query_scalar("SELECT status FROM epoch WHERE id = $1 FOR UPDATE")
        .bind(to_db(epoch_id)?)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::EpochNotFound(epoch_id))?;
    Ok(status.parse()?)
}

// =============================================================================
// ADAPTER
// =============================================================================

/// Repository backed by PostgreSQL.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Connect a pool. Does not touch the schema.
    pub async fn connect(
        endpoint: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, RepositoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(endpoint)
            .await?;
        info!(max_connections, "[rn-01] Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables of a fresh database. Idempotent.
    ///
    /// The node never calls this on its own; schema changes are an operator
    /// action.
    pub async fn install_schema(&self) -> Result<(), RepositoryError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    async fn select_epoch(
        &self,
        app: Address,
        index: u64,
    ) -> Result<Option<Epoch>, RepositoryError> {
        let sql = format!(
            r#"SELECT {EPOCH_COLUMNS} FROM epoch e JOIN application a ON a.id = e.application_id
               WHERE a.contract_address = $1 AND e."index" = $2"#
        );
        sqlx::query::<Postgres>(&sql)
            .bind(&app[..])
            .bind(to_db(index)?)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(epoch_from_row)
            .transpose()
    }

    async fn update_cursor(
        &self,
        app: Address,
        column: &'static str,
        block: u64,
    ) -> Result<(), RepositoryError> {
        let sql = format!("UPDATE application SET {column} = $2 WHERE contract_address = $1");
        let result = sqlx::query::<Postgres>(&sql)
            .bind(&app[..])
            .bind(to_db(block)?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::ApplicationNotFound(app));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn check_schema_version(&self) -> Result<(), RepositoryError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        match found {
            Some(version) if version == SCHEMA_VERSION => Ok(()),
            other => Err(RepositoryError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: other.unwrap_or(0),
            }),
        }
    }

    async fn insert_application(&self, app: &Application) -> Result<u64, RepositoryError> {
        let inserted = sqlx::query_scalar::<Postgres, i64>(
            "INSERT INTO application (contract_address, template_hash, iconsensus_address, \
             last_processed_block, last_claim_check_block, last_output_check_block, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(&app.contract_address[..])
        .bind(&app.template_hash[..])
        .bind(&app.iconsensus_address[..])
        .bind(to_db(app.last_processed_block)?)
        .bind(to_db(app.last_claim_check_block)?)
        .bind(to_db(app.last_output_check_block)?)
        .bind(app.status.as_str())
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(id) => from_db(id),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RepositoryError::DuplicateApplication(app.contract_address))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_application(
        &self,
        address: Address,
    ) -> Result<Option<Application>, RepositoryError> {
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM application a WHERE a.contract_address = $1");
        sqlx::query::<Postgres>(&sql)
            .bind(&address[..])
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(application_from_row)
            .transpose()
    }

    async fn get_all_running_applications(&self) -> Result<Vec<Application>, RepositoryError> {
        let sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM application a \
             WHERE a.status = 'running' ORDER BY a.contract_address"
        );
        let rows = sqlx::query::<Postgres>(&sql).fetch_all(&self.pool).await?;
        collect(rows, application_from_row)
    }

    async fn get_last_processed_block(&self, app: Address) -> Result<u64, RepositoryError> {
        let block: i64 = sqlx::query_scalar(
            "SELECT last_processed_block FROM application WHERE contract_address = $1",
        )
        .bind(&app[..])
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::ApplicationNotFound(app))?;
        from_db(block)
    }

    async fn update_last_claim_check_block(
        &self,
        app: Address,
        block: u64,
    ) -> Result<(), RepositoryError> {
        self.update_cursor(app, "last_claim_check_block", block).await
    }

    async fn update_last_output_check_block(
        &self,
        app: Address,
        block: u64,
    ) -> Result<(), RepositoryError> {
        self.update_cursor(app, "last_output_check_block", block).await
    }

    async fn store_epochs_and_inputs(
        &self,
        app: Address,
        epochs: Vec<EpochInputs>,
        last_processed_block: u64,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let (app_id, current) = lock_application(&mut tx, app).await?;
        rules::check_processed_block(app, current, last_processed_block)?;

        let indices = epochs
            .iter()
            .map(|entry| to_db(entry.epoch.index))
            .collect::<Result<Vec<_>, _>>()?;
        let sql = format!(
            r#"SELECT {EPOCH_COLUMNS} FROM epoch e JOIN application a ON a.id = e.application_id
               WHERE e.application_id = $1 AND e."index" = ANY($2)"#
        );
        let rows = sqlx::query::<Postgres>(&sql)
            .bind(app_id)
            .bind(indices.as_slice())
            .fetch_all(&mut *tx)
            .await?;
        let stored: BTreeMap<u64, Epoch> = collect(rows, epoch_from_row)?
            .into_iter()
            .map(|epoch| (epoch.index, epoch))
            .collect();

        let last_epoch_index: Option<i64> =
            sqlx::query_scalar(r#"SELECT MAX("index") FROM epoch WHERE application_id = $1"#)
                .bind(app_id)
                .fetch_one(&mut *tx)
                .await?;
        let input_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM input WHERE application_id = $1")
                .bind(app_id)
                .fetch_one(&mut *tx)
                .await?;

        let plan = rules::plan_epochs_and_inputs(
            app,
            &stored,
            last_epoch_index.map(from_db).transpose()?,
            from_db(input_count)?,
            epochs,
        )?;
        let (new_epochs, closed_epochs, inputs) =
            (plan.new_epochs.len(), plan.closed_epochs.len(), plan.inputs.len());

        let mut epoch_ids: HashMap<u64, i64> = stored
            .values()
            .map(|epoch| Ok((epoch.index, to_db(epoch.id)?)))
            .collect::<Result<_, RepositoryError>>()?;

        for epoch in &plan.new_epochs {
            let id: i64 = sqlx::query_scalar(
                r#"INSERT INTO epoch (application_id, "index", first_block, last_block, status)
                   VALUES ($1, $2, $3, $4, $5) RETURNING id"#,
            )
            .bind(app_id)
            .bind(to_db(epoch.index)?)
            .bind(to_db(epoch.first_block)?)
            .bind(to_db(epoch.last_block)?)
            .bind(epoch.status.as_str())
            .fetch_one(&mut *tx)
            .await?;
            epoch_ids.insert(epoch.index, id);
        }

        for index in &plan.closed_epochs {
            sqlx::query::<Postgres>(
                r#"UPDATE epoch SET status = 'closed'
                   WHERE application_id = $1 AND "index" = $2 AND status = 'open'"#,
            )
            .bind(app_id)
            .bind(to_db(*index)?)
            .execute(&mut *tx)
            .await?;
        }

        for (epoch_index, input) in &plan.inputs {
            let epoch_id = epoch_ids
                .get(epoch_index)
                .copied()
                .ok_or(RepositoryError::EpochNotFound(*epoch_index))?;
            sqlx::query::<Postgres>(
                r#"INSERT INTO input (application_id, epoch_id, "index", block_number, raw_data,
                                      status, transaction_reference)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            )
            .bind(app_id)
            .bind(epoch_id)
            .bind(to_db(input.index)?)
            .bind(to_db(input.block_number)?)
            .bind(input.raw_data.as_slice())
            .bind(input.status.as_str())
            .bind(&input.transaction_reference[..])
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query::<Postgres>("UPDATE application SET last_processed_block = $2 WHERE id = $1")
            .bind(app_id)
            .bind(to_db(last_processed_block)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(
            new_epochs,
            closed_epochs, inputs, last_processed_block, "[rn-01] Stored epochs and inputs"
        );
        Ok(())
    }

    async fn get_epoch(&self, app: Address, index: u64) -> Result<Option<Epoch>, RepositoryError> {
        self.select_epoch(app, index).await
    }

    async fn get_input(&self, app: Address, index: u64) -> Result<Option<Input>, RepositoryError> {
        let sql = format!(
            r#"SELECT {INPUT_COLUMNS} FROM input i JOIN application a ON a.id = i.application_id
               WHERE a.contract_address = $1 AND i."index" = $2"#
        );
        sqlx::query::<Postgres>(&sql)
            .bind(&app[..])
            .bind(to_db(index)?)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(input_from_row)
            .transpose()
    }

    async fn get_input_count(&self, app: Address) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM input i JOIN application a ON a.id = i.application_id \
             WHERE a.contract_address = $1",
        )
        .bind(&app[..])
        .fetch_one(&self.pool)
        .await?;
        from_db(count)
    }

    async fn get_outputs_by_input(&self, input_id: u64) -> Result<Vec<Output>, RepositoryError> {
        let sql =
            format!(r#"SELECT {OUTPUT_COLUMNS} FROM output o WHERE o.input_id = $1 ORDER BY o."index""#);
        let rows = sqlx::query::<Postgres>(&sql)
            .bind(to_db(input_id)?)
            .fetch_all(&self.pool)
            .await?;
        collect(rows, output_from_row)
    }

    async fn get_reports_by_input(&self, input_id: u64) -> Result<Vec<Report>, RepositoryError> {
        let rows = sqlx::query::<Postgres>(
            r#"SELECT id, input_id, "index", raw_data FROM report
               WHERE input_id = $1 ORDER BY "index""#,
        )
        .bind(to_db(input_id)?)
        .fetch_all(&self.pool)
        .await?;
        collect(rows, report_from_row)
    }

    async fn get_unprocessed_inputs(
        &self,
        apps: &[Address],
    ) -> Result<HashMap<Address, Vec<Input>>, RepositoryError> {
        let addresses: Vec<Vec<u8>> = apps.iter().map(|app| app.to_vec()).collect();
        let sql = format!(
            r#"SELECT {INPUT_COLUMNS} FROM input i
               JOIN application a ON a.id = i.application_id
               JOIN epoch e ON e.id = i.epoch_id
               WHERE a.contract_address = ANY($1) AND i.status = 'none' AND e.status <> 'open'
               ORDER BY a.contract_address, i."index""#
        );
        let rows = sqlx::query::<Postgres>(&sql)
            .bind(addresses)
            .fetch_all(&self.pool)
            .await?;

        let mut by_app: HashMap<Address, Vec<Input>> = HashMap::new();
        for input in collect(rows, input_from_row)? {
            by_app
                .entry(input.application_address)
                .or_default()
                .push(input);
        }
        Ok(by_app)
    }

    async fn store_advance_result(
        &self,
        input: &Input,
        result: &AdvanceResult,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let input_id = to_db(input.id)?;

        let row = sqlx::query::<Postgres>(
            "SELECT status, application_id FROM input WHERE id = $1 FOR UPDATE",
        )
        .bind(input_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::InputNotFound(input.id))?;
        let status: InputCompletionStatus = row.try_get::<String, _>("status")?.parse()?;
        let app_id: i64 = row.try_get("application_id")?;
        rules::check_advance_result(input.id, status, result)?;

        sqlx::query::<Postgres>("SELECT id FROM application WHERE id = $1 FOR UPDATE")
            .bind(app_id)
            .execute(&mut *tx)
            .await?;
        let mut next_output_index: i64 = sqlx::query_scalar(
            r#"SELECT COALESCE(MAX("index") + 1, 0) FROM output WHERE application_id = $1"#,
        )
        .bind(app_id)
        .fetch_one(&mut *tx)
        .await?;

        for raw_data in &result.outputs {
            sqlx::query::<Postgres>(
                r#"INSERT INTO output (application_id, input_id, "index", raw_data)
                   VALUES ($1, $2, $3, $4)"#,
            )
            .bind(app_id)
            .bind(input_id)
            .bind(next_output_index)
            .bind(raw_data.as_slice())
            .execute(&mut *tx)
            .await?;
            next_output_index += 1;
        }

        for (index, raw_data) in result.reports.iter().enumerate() {
            sqlx::query::<Postgres>(
                r#"INSERT INTO report (input_id, "index", raw_data) VALUES ($1, $2, $3)"#,
            )
            .bind(input_id)
            .bind(to_db(index as u64)?)
            .bind(raw_data.as_slice())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query::<Postgres>(
            "UPDATE input SET status = $2, outputs_hash = $3, machine_hash = $4 WHERE id = $1",
        )
        .bind(input_id)
        .bind(result.status.as_str())
        .bind(&result.outputs_hash[..])
        .bind(result.machine_hash.map(|hash| hash.to_vec()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn promote_closed_epochs_fully_processed(
        &self,
        app: Address,
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let (app_id, _) = lock_application(&mut tx, app).await?;
        let result = sqlx::query::<Postgres>(
            "UPDATE epoch e SET status = 'processed_all_inputs' \
             WHERE e.application_id = $1 AND e.status = 'closed' \
             AND NOT EXISTS (SELECT 1 FROM input i WHERE i.epoch_id = e.id AND i.status = 'none')",
        )
        .bind(app_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn get_processed_epochs(&self, app: Address) -> Result<Vec<Epoch>, RepositoryError> {
        let sql = format!(
            r#"SELECT {EPOCH_COLUMNS} FROM epoch e JOIN application a ON a.id = e.application_id
               WHERE a.contract_address = $1 AND e.status IN {PROCESSED_STATUSES}
               ORDER BY e."index""#
        );
        let rows = sqlx::query::<Postgres>(&sql)
            .bind(&app[..])
            .fetch_all(&self.pool)
            .await?;
        collect(rows, epoch_from_row)
    }

    async fn get_outputs_produced_in_block_range(
        &self,
        app: Address,
        first_block: u64,
        last_block: u64,
    ) -> Result<Vec<Output>, RepositoryError> {
        let sql = format!(
            r#"SELECT {OUTPUT_COLUMNS} FROM output o
               JOIN input i ON i.id = o.input_id
               JOIN application a ON a.id = o.application_id
               WHERE a.contract_address = $1 AND i.block_number BETWEEN $2 AND $3
               ORDER BY o."index""#
        );
        let rows = sqlx::query::<Postgres>(&sql)
            .bind(&app[..])
            .bind(to_db(first_block)?)
            .bind(to_db(last_block)?)
            .fetch_all(&self.pool)
            .await?;
        collect(rows, output_from_row)
    }

    async fn count_unprocessed_inputs_in_block_range(
        &self,
        app: Address,
        first_block: u64,
        last_block: u64,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM input i JOIN application a ON a.id = i.application_id \
             WHERE a.contract_address = $1 AND i.status = 'none' \
             AND i.block_number BETWEEN $2 AND $3",
        )
        .bind(&app[..])
        .bind(to_db(first_block)?)
        .bind(to_db(last_block)?)
        .fetch_one(&self.pool)
        .await?;
        from_db(count)
    }

    async fn get_previous_epoch(&self, epoch: &Epoch) -> Result<Option<Epoch>, RepositoryError> {
        match epoch.index.checked_sub(1) {
            Some(previous) => self.select_epoch(epoch.application_address, previous).await,
            None => Ok(None),
        }
    }

    async fn get_last_input(&self, epoch: &Epoch) -> Result<Option<Input>, RepositoryError> {
        let sql = format!(
            r#"SELECT {INPUT_COLUMNS} FROM input i JOIN application a ON a.id = i.application_id
               WHERE i.epoch_id = $1 ORDER BY i."index" DESC LIMIT 1"#
        );
        sqlx::query::<Postgres>(&sql)
            .bind(to_db(epoch.id)?)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(input_from_row)
            .transpose()
    }

    async fn get_last_input_outputs_hash(
        &self,
        epoch: &Epoch,
    ) -> Result<Option<Hash>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let status = lock_epoch(&mut tx, epoch.id).await?;
        if status != EpochStatus::ProcessedAllInputs {
            return Err(RepositoryError::EpochNotProcessed {
                epoch_id: epoch.id,
                status,
            });
        }

        let hash: Option<Option<Vec<u8>>> = sqlx::query_scalar(
            r#"SELECT outputs_hash FROM input WHERE epoch_id = $1 ORDER BY "index" DESC LIMIT 1"#,
        )
        .bind(to_db(epoch.id)?)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        fixed_opt(hash.flatten())
    }

    async fn set_epoch_claim_and_insert_proofs(
        &self,
        epoch: &Epoch,
        claim_hash: Hash,
        outputs: &[Output],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let status = lock_epoch(&mut tx, epoch.id).await?;
        rules::check_transition(epoch.id, status, EpochStatus::ClaimComputed)?;

        for output in outputs {
            let siblings: Vec<Vec<u8>> = output
                .output_hashes_siblings
                .iter()
                .map(|hash| hash.to_vec())
                .collect();
            let result = sqlx::query::<Postgres>(
                "UPDATE output SET hash = $2, output_hashes_siblings = $3 WHERE id = $1",
            )
            .bind(to_db(output.id)?)
            .bind(output.hash.map(|hash| hash.to_vec()))
            .bind(siblings)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(RepositoryError::OutputNotFound(output.id));
            }
        }

        sqlx::query::<Postgres>(
            "UPDATE epoch SET claim_hash = $2, status = 'claim_computed' WHERE id = $1",
        )
        .bind(to_db(epoch.id)?)
        .bind(&claim_hash[..])
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn select_computed_claims(&self) -> Result<Vec<ComputedClaim>, RepositoryError> {
        let rows = sqlx::query::<Postgres>(
            r#"SELECT e.id, a.contract_address, a.iconsensus_address, e."index",
                      e.first_block, e.last_block, e.claim_hash
               FROM epoch e JOIN application a ON a.id = e.application_id
               WHERE e.status = 'claim_computed'
               ORDER BY a.contract_address, e."index""#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let epoch_id = from_db(row.try_get("id")?)?;
                let claim_hash = fixed_opt(row.try_get("claim_hash")?)?.ok_or_else(|| {
                    RepositoryError::Corrupt(format!(
                        "epoch {epoch_id} is claim_computed without a claim"
                    ))
                })?;
                Ok(ComputedClaim {
                    epoch_id,
                    app_address: fixed(row.try_get("contract_address")?)?,
                    iconsensus_address: fixed(row.try_get("iconsensus_address")?)?,
                    epoch_index: from_db(row.try_get("index")?)?,
                    first_block: from_db(row.try_get("first_block")?)?,
                    last_block: from_db(row.try_get("last_block")?)?,
                    claim_hash,
                })
            })
            .collect()
    }

    async fn update_epoch_with_submitted_claim(
        &self,
        epoch_id: u64,
        transaction_hash: Hash,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let status = lock_epoch(&mut tx, epoch_id).await?;
        rules::check_transition(epoch_id, status, EpochStatus::ClaimSubmitted)?;

        sqlx::query::<Postgres>(
            "UPDATE epoch SET status = 'claim_submitted', transaction_hash = $2 WHERE id = $1",
        )
        .bind(to_db(epoch_id)?)
        .bind(&transaction_hash[..])
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_epoch_with_accepted_claim(
        &self,
        app: Address,
        last_block: u64,
        claim_hash: Hash,
        transaction_hash: Hash,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query::<Postgres>(
            "UPDATE epoch e SET status = 'claim_accepted', transaction_hash = $4 \
             FROM application a \
             WHERE a.id = e.application_id AND a.contract_address = $1 \
             AND e.last_block = $2 AND e.claim_hash = $3 AND e.status = 'claim_submitted'",
        )
        .bind(&app[..])
        .bind(to_db(last_block)?)
        .bind(&claim_hash[..])
        .bind(&transaction_hash[..])
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_output_executed(
        &self,
        app: Address,
        output_index: u64,
        transaction_hash: Hash,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query::<Postgres>(
            r#"UPDATE output o SET transaction_hash = $3
               FROM application a
               WHERE a.id = o.application_id AND a.contract_address = $1 AND o."index" = $2"#,
        )
        .bind(&app[..])
        .bind(to_db(output_index)?)
        .bind(&transaction_hash[..])
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_fixed_width_columns_are_checked() {
        assert_eq!(fixed::<4>(vec![1, 2, 3, 4]).unwrap(), [1, 2, 3, 4]);
        assert_eq!(fixed::<4>(vec![1]).unwrap_err().error_kind(), "corrupt_row");
        assert_eq!(fixed_opt::<2>(None).unwrap(), None);
    }

    #[test]
    fn test_bigint_conversion_bounds() {
        assert!(to_db(u64::MAX).is_err());
        assert!(from_db(-1).is_err());
        assert_eq!(from_db(to_db(42).unwrap()).unwrap(), 42);
    }

    /// Runs only when `ROLLUPS_TEST_POSTGRES_ENDPOINT` names a scratch
    /// database.
    async fn scratch() -> Option<PostgresRepository> {
        let endpoint = std::env::var("ROLLUPS_TEST_POSTGRES_ENDPOINT").ok()?;
        let repo = PostgresRepository::connect(&endpoint, 2, Duration::from_secs(5))
            .await
            .unwrap();
        repo.install_schema().await.unwrap();
        Some(repo)
    }

    fn unique_address() -> Address {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut address = [0u8; 20];
        address[4..].copy_from_slice(&nanos.to_be_bytes());
        address
    }

    #[tokio::test]
    async fn test_postgres_pipeline_round_trip() {
        let Some(repo) = scratch().await else {
            return;
        };
        repo.check_schema_version().await.unwrap();

        let app = unique_address();
        repo.insert_application(&Application::new(app, [1; 32], [2; 20]))
            .await
            .unwrap();
        let epoch = Epoch {
            status: EpochStatus::Closed,
            ..Epoch::at_index(app, 0, 5, 16)
        };
        repo.store_epochs_and_inputs(
            app,
            vec![EpochInputs {
                epoch,
                inputs: vec![Input::unprocessed(app, 0, 17, vec![0xde, 0xad], [3; 32])],
            }],
            21,
        )
        .await
        .unwrap();

        let input = repo.get_input(app, 0).await.unwrap().unwrap();
        let result = AdvanceResult {
            status: InputCompletionStatus::Accepted,
            outputs: vec![vec![0xde, 0xad]],
            reports: vec![],
            outputs_hash: [4; 32],
            machine_hash: Some([5; 32]),
        };
        repo.store_advance_result(&input, &result).await.unwrap();
        assert_eq!(repo.promote_closed_epochs_fully_processed(app).await.unwrap(), 1);

        let epoch = repo.get_epoch(app, 0).await.unwrap().unwrap();
        assert_eq!(
            repo.get_last_input_outputs_hash(&epoch).await.unwrap(),
            Some([4; 32])
        );

        let mut outputs = repo
            .get_outputs_produced_in_block_range(app, 0, epoch.last_block)
            .await
            .unwrap();
        outputs[0].hash = Some([6; 32]);
        outputs[0].output_hashes_siblings = vec![[7; 32]; 63];
        repo.set_epoch_claim_and_insert_proofs(&epoch, [8; 32], &outputs)
            .await
            .unwrap();

        let claims = repo.select_computed_claims().await.unwrap();
        let claim = claims.iter().find(|c| c.app_address == app).unwrap();
        repo.update_epoch_with_submitted_claim(claim.epoch_id, [9; 32])
            .await
            .unwrap();
        assert!(repo
            .update_epoch_with_accepted_claim(app, claim.last_block, [8; 32], [10; 32])
            .await
            .unwrap());

        let stored = repo.get_outputs_by_input(input.id).await.unwrap();
        assert_eq!(stored[0].output_hashes_siblings.len(), 63);
    }

    #[tokio::test]
    async fn test_postgres_duplicate_input_rolls_back() {
        let Some(repo) = scratch().await else {
            return;
        };
        let app = unique_address();
        repo.insert_application(&Application::new(app, [1; 32], [2; 20]))
            .await
            .unwrap();
        let batch = || {
            vec![EpochInputs {
                epoch: Epoch::at_index(app, 0, 5, 16),
                inputs: vec![Input::unprocessed(app, 0, 17, vec![], [3; 32])],
            }]
        };
        repo.store_epochs_and_inputs(app, batch(), 18).await.unwrap();

        let err = repo.store_epochs_and_inputs(app, batch(), 19).await.unwrap_err();
        assert_eq!(err, RepositoryError::DuplicateInput { app, index: 0 });
        assert_eq!(repo.get_last_processed_block(app).await.unwrap(), 18);
    }
}
