use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snowflake_connector_rs::{
    SnowflakeAuthMethod, SnowflakeClient, SnowflakeClientConfig, SnowflakeSession,
};

use crate::config::ConnectionSettings;
use crate::error::{Result, TranslatorError};
use crate::surface::ChatSurface;

pub const NO_ERROR_FIX_FOUND: &str = "No specific error fix suggestion was found.";

/// Rows returned by a query, cells kept as JSON strings or null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Case-insensitive column lookup; Snowflake upper-cases unquoted names.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    pub fn text(&self, row: usize, column: &str) -> Option<String> {
        let idx = self.column_index(column)?;
        match self.rows.get(row)?.get(idx)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[async_trait]
pub trait SqlBackend: Send + Sync {
    async fn query(&self, sql: &str) -> Result<QueryTable>;
}

#[derive(Clone)]
pub struct SnowflakeEngine {
    session: Arc<SnowflakeSession>,
    account: String,
    database: String,
    schema: String,
}

impl fmt::Debug for SnowflakeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeEngine")
            .field("account", &self.account)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

impl SnowflakeEngine {
    pub async fn new(settings: &ConnectionSettings) -> Result<Self> {
        let client = SnowflakeClient::new(
            &settings.user,
            SnowflakeAuthMethod::Password(settings.password.clone()),
            SnowflakeClientConfig {
                account: settings.account.clone(),
                role: Some(settings.role.clone()),
                warehouse: Some(settings.warehouse.clone()),
                database: Some(settings.database.clone()),
                schema: Some(settings.schema.clone()),
                timeout: Some(std::time::Duration::from_secs(30)),
            },
        )
        .map_err(|e| TranslatorError::Connection(e.to_string()))?;
        let session = client
            .create_session()
            .await
            .map_err(|e| TranslatorError::Connection(e.to_string()))?;

        tracing::info!(
            account = %settings.account,
            database = %settings.database,
            schema = %settings.schema,
            "connected to Snowflake"
        );

        Ok(SnowflakeEngine {
            session: Arc::new(session),
            account: settings.account.clone(),
            database: settings.database.clone(),
            schema: settings.schema.clone(),
        })
    }
}

#[async_trait]
impl SqlBackend for SnowflakeEngine {
    async fn query(&self, sql: &str) -> Result<QueryTable> {
        let results = self.session.query(sql).await?;

        let columns: Vec<String> = results.first().map_or_else(Vec::new, |first_row| {
            first_row
                .column_types()
                .into_iter()
                .map(|col| col.name().to_string())
                .collect()
        });

        let rows = results
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|name| match row.get::<Option<String>>(name) {
                        Ok(Some(s)) => Value::String(s),
                        _ => Value::Null,
                    })
                    .collect()
            })
            .collect();

        Ok(QueryTable { columns, rows })
    }
}

/// Drops every `;` so a single call cannot chain statements.
///
/// This is a naive guard: it also mangles semicolons inside string literals
/// and does not make interpolated input safe.
pub fn strip_statement_separators(query: &str) -> String {
    query.replace(';', "")
}

/// Escapes a value for use inside a single-quoted SQL literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Runs `query` once. Failures are reported on the surface and yield `None`.
pub async fn run_query(
    backend: &dyn SqlBackend,
    query: &str,
    surface: &mut dyn ChatSurface,
) -> Option<QueryTable> {
    let cleaned = strip_statement_separators(query);
    tracing::debug!(sql = %cleaned.trim(), "executing query");
    match backend.query(&cleaned).await {
        Ok(table) => {
            tracing::debug!(rows = table.row_count(), "query finished");
            Some(table)
        }
        Err(err) => {
            let err = match err {
                err @ TranslatorError::Query(_) => err,
                other => TranslatorError::Query(other.to_string()),
            };
            tracing::warn!("{}", err);
            surface.error(&err.to_string());
            None
        }
    }
}

pub fn function_details_query(doc_id: &str) -> String {
    format!(
        "
        SELECT
            sf.SF_FUNC_NAME,
            sf.sf_func_desc,
            sf.sf_return_val,
            sf.FUNCTION_MAPPING_ID,
            sf.sf_func_SYNTAX
        FROM sf_FUNC sf
        JOIN hive_FUNC hf ON sf.function_mapping_id = hf.function_mapping_id
        WHERE sf.function_mapping_id = '{}'
    ",
        escape_literal(doc_id)
    )
}

pub fn error_fix_query(doc_id: &str) -> String {
    format!(
        "
        SELECT ERROR_REASON, ERROR_FIX_SUGGESTION, SF_FUNC_NAME
        FROM error_info
        WHERE FUNCTION_MAPPING_ID = '{}'
    ",
        escape_literal(doc_id)
    )
}

/// Snowflake function metadata for a mapping id. `None` when the lookup
/// fails or the id has no rows.
pub async fn fetch_function_details(
    backend: &dyn SqlBackend,
    doc_id: &str,
    surface: &mut dyn ChatSurface,
) -> Option<QueryTable> {
    let table = run_query(backend, &function_details_query(doc_id), surface).await?;
    if table.is_empty() {
        tracing::debug!(doc_id, "no function details");
        return None;
    }
    Some(table)
}

/// Markdown suggestion built from the first `error_info` row for `doc_id`.
pub async fn fetch_error_fix_suggestion(
    backend: &dyn SqlBackend,
    doc_id: &str,
    surface: &mut dyn ChatSurface,
) -> String {
    let Some(table) = run_query(backend, &error_fix_query(doc_id), surface).await else {
        return NO_ERROR_FIX_FOUND.to_string();
    };
    if table.is_empty() {
        return NO_ERROR_FIX_FOUND.to_string();
    }

    let field = |name: &str| table.text(0, name).unwrap_or_default();
    format!(
        "### Error Reason:\n{}\n\n### Suggested Fix:\n{}\n\n### Snowflake Function Name:\n{}",
        field("ERROR_REASON"),
        field("ERROR_FIX_SUGGESTION"),
        field("SF_FUNC_NAME")
    )
}
