//! Snowflake over its session REST endpoints (the ones the official
//! connectors use): password login, then one statement per request.
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::schema::{Cell, ColumnType, Dialect, Row, TableSchema};
use super::TableSink;
use crate::config;
use crate::error::{Result, SyncError};

const SERVICE: &str = "snowflake";
const CLIENT_APP_ID: &str = "ordoro-sync";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
/// Rows per array-bound `INSERT`.
pub const INSERT_BATCH_ROWS: usize = 1000;
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_POLLS: u32 = 1200;
/// Response codes meaning "still running, poll `getResultUrl`".
const IN_PROGRESS_CODES: [&str; 2] = ["333333", "333334"];

#[derive(Deserialize, Debug, Default)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    success: bool,
}

impl Envelope {
    fn in_progress(&self) -> bool {
        self.code
            .as_deref()
            .map(|c| IN_PROGRESS_CODES.contains(&c))
            .unwrap_or(false)
    }

    fn describe(&self) -> String {
        format!(
            "{} ({})",
            self.message.as_deref().unwrap_or("no message"),
            self.code.as_deref().unwrap_or("no code")
        )
    }

    fn result_url(&self) -> Option<&str> {
        self.data.as_ref()?.get("getResultUrl")?.as_str()
    }
}

/// Outcome of one statement.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QueryData {
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub rowset: Option<Vec<Vec<Value>>>,
}

pub struct SnowflakeClient {
    http: Client,
    base_url: Url,
    token: String,
    sequence: AtomicU64,
}

impl fmt::Debug for SnowflakeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

fn account_name(account: &str) -> &str {
    account.split('.').next().unwrap_or(account)
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| SyncError::warehouse(format!("invalid Snowflake URL {path:?}: {e}")))
}

impl SnowflakeClient {
    /// Open a session with user/password credentials.
    pub async fn login(cfg: &config::Snowflake) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("ordoro-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::warehouse(format!("failed to build HTTP client: {e}")))?;

        let mut url = join(&cfg.base_url, "session/v1/login-request")?;
        url.query_pairs_mut()
            .append_pair("request_id", &Uuid::new_v4().to_string())
            .append_pair("databaseName", &cfg.database)
            .append_pair("schemaName", &cfg.schema)
            .append_pair("warehouse", &cfg.warehouse)
            .append_pair("roleName", &cfg.role);

        let body = json!({
            "data": {
                "CLIENT_APP_ID": CLIENT_APP_ID,
                "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
                "ACCOUNT_NAME": account_name(&cfg.account),
                "LOGIN_NAME": cfg.user,
                "PASSWORD": cfg.password,
            }
        });

        let res = http
            .post(url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::warehouse(format!("cannot reach Snowflake: {e}")))?;

        let status = res.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(SyncError::auth(SERVICE, format!("login rejected with {status}")));
        }
        let envelope = read_envelope(res).await?;
        if !envelope.success {
            return Err(SyncError::auth(SERVICE, envelope.describe()));
        }
        let token = envelope
            .data
            .as_ref()
            .and_then(|d| d.get("token"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SyncError::warehouse("login response carried no session token"))?;

        info!(account = %cfg.account, user = %cfg.user, role = %cfg.role, "Snowflake session opened");
        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            token,
            sequence: AtomicU64::new(0),
        })
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("Authorization", format!("Snowflake Token=\"{}\"", self.token))
            .header("Accept", "application/snowflake")
    }

    /// Run one statement, waiting for it to finish.
    #[instrument(skip_all)]
    pub async fn execute(&self, sql: &str, bindings: Option<Value>) -> Result<QueryData> {
        let sequence_id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let mut url = join(&self.base_url, "queries/v1/query-request")?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());

        let mut body = json!({
            "sqlText": sql,
            "asyncExec": false,
            "sequenceId": sequence_id,
            "querySubmissionTime": Utc::now().timestamp_millis(),
        });
        if let Some(bindings) = bindings {
            body["bindings"] = bindings;
        }
        debug!(sequence_id, sql = %sql.lines().next().unwrap_or_default(), "executing statement");

        let res = self
            .authorized(self.http.post(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::warehouse(format!("statement request failed: {e}")))?;
        let mut envelope = read_envelope(res).await?;

        let mut polls = 0u32;
        while envelope.in_progress() {
            polls += 1;
            if polls > MAX_POLLS {
                return Err(SyncError::warehouse("statement did not finish in time"));
            }
            let path = envelope
                .result_url()
                .ok_or_else(|| SyncError::warehouse("running statement without a result URL"))?
                .trim_start_matches('/')
                .to_string();
            tokio::time::sleep(POLL_INTERVAL).await;
            let res = self
                .authorized(self.http.get(join(&self.base_url, &path)?))
                .send()
                .await
                .map_err(|e| SyncError::warehouse(format!("result poll failed: {e}")))?;
            envelope = read_envelope(res).await?;
        }

        if !envelope.success {
            return Err(SyncError::warehouse(format!(
                "statement failed: {}",
                envelope.describe()
            )));
        }
        match envelope.data {
            Some(data) => serde_json::from_value(data).map_err(|e| undecodable("query result", e)),
            None => Ok(QueryData::default()),
        }
    }

    /// End the session. Failures are only logged.
    pub async fn close(&self) {
        let url = match join(&self.base_url, "session?delete=true") {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "cannot build logout URL");
                return;
            }
        };
        match self.authorized(self.http.post(url)).send().await {
            Ok(res) if res.status().is_success() => debug!("Snowflake session closed"),
            Ok(res) => warn!(status = %res.status(), "Snowflake logout refused"),
            Err(err) => warn!(error = %err, "Snowflake logout failed"),
        }
    }
}

async fn read_envelope(res: Response) -> Result<Envelope> {
    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|e| SyncError::warehouse(format!("failed to read Snowflake response: {e}")))?;
    if !status.is_success() {
        return Err(SyncError::warehouse(format!(
            "Snowflake returned {status}: {body}"
        )));
    }
    serde_json::from_str(&body).map_err(|e| undecodable("response", e))
}

/// Anything unreadable coming back from Snowflake is a warehouse failure.
fn undecodable(what: &str, err: serde_json::Error) -> SyncError {
    SyncError::warehouse(format!("could not decode Snowflake {what}: {err}"))
}

fn binding_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Text => "TEXT",
        ColumnType::Integer => "FIXED",
        ColumnType::Decimal | ColumnType::Float => "REAL",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Timestamp => "TIMESTAMP_NTZ",
    }
}

fn binding_value(cell: &Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Int(v) => Value::String(v.to_string()),
        Cell::Decimal(v) => Value::String(v.to_string()),
        Cell::Text(v) => Value::String(v.clone()),
        Cell::Bool(v) => Value::String(v.to_string()),
        // Snowflake takes TIMESTAMP_NTZ binds as nanoseconds since the epoch.
        Cell::Timestamp(v) => v
            .and_utc()
            .timestamp_nanos_opt()
            .map(|n| Value::String(n.to_string()))
            .unwrap_or(Value::Null),
    }
}

/// Column-wise array bindings for one `INSERT ... VALUES (?, ...)`.
pub fn array_bindings(table: &TableSchema, rows: &[Row]) -> Value {
    let mut bindings = Map::new();
    for (i, column) in table.columns.iter().enumerate() {
        let values: Vec<Value> = rows
            .iter()
            .map(|row| row.get(i).map(binding_value).unwrap_or(Value::Null))
            .collect();
        bindings.insert(
            (i + 1).to_string(),
            json!({ "type": binding_type(column.ty), "value": values }),
        );
    }
    Value::Object(bindings)
}

/// Loads through staging twins and `ALTER TABLE ... SWAP WITH`.
#[derive(Debug)]
pub struct SnowflakeSink {
    client: SnowflakeClient,
    database: String,
    schema: String,
}

impl SnowflakeSink {
    pub async fn connect(cfg: &config::Snowflake) -> Result<Self> {
        let client = SnowflakeClient::login(cfg).await?;
        Ok(Self::new(client, cfg))
    }

    pub fn new(client: SnowflakeClient, cfg: &config::Snowflake) -> Self {
        Self {
            client,
            database: cfg.database.clone(),
            schema: cfg.schema.clone(),
        }
    }

    pub fn client(&self) -> &SnowflakeClient {
        &self.client
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}.{}", self.database, self.schema, table)
    }

    pub async fn close(&self) {
        self.client.close().await;
    }
}

#[async_trait]
impl TableSink for SnowflakeSink {
    #[instrument(skip_all, fields(table = table.name))]
    async fn stage(&self, table: &TableSchema, rows: &[Row]) -> Result<usize> {
        let staging = self.qualified(&table.staging_name());
        self.client
            .execute(
                &format!(
                    "CREATE OR REPLACE TABLE {staging} {}",
                    table.definition(Dialect::Snowflake)
                ),
                None,
            )
            .await?;

        let insert = table.insert_sql(&staging, 1);
        let mut written = 0usize;
        for chunk in rows.chunks(INSERT_BATCH_ROWS) {
            self.client
                .execute(&insert, Some(array_bindings(table, chunk)))
                .await?;
            written += chunk.len();
            debug!(written, total = rows.len(), "inserted batch");
        }
        Ok(written)
    }

    #[instrument(skip_all)]
    async fn commit(&self, tables: &[&TableSchema]) -> Result<()> {
        for table in tables {
            let live = self.qualified(table.name);
            let staging = self.qualified(&table.staging_name());
            self.client
                .execute(
                    &format!(
                        "CREATE TABLE IF NOT EXISTS {live} {}",
                        table.definition(Dialect::Snowflake)
                    ),
                    None,
                )
                .await?;
            self.client
                .execute(&format!("ALTER TABLE {staging} SWAP WITH {live}"), None)
                .await?;
            // After the swap the staging name holds the previous contents.
            self.client
                .execute(&format!("DROP TABLE IF EXISTS {staging}"), None)
                .await?;
            info!(table = table.name, "swapped into place");
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn discard(&self, tables: &[&TableSchema]) -> Result<()> {
        for table in tables {
            let staging = self.qualified(&table.staging_name());
            self.client
                .execute(&format!("DROP TABLE IF EXISTS {staging}"), None)
                .await?;
        }
        Ok(())
    }
}
