//! Connection and agent settings.
//!
//! The defaults are the constants the translator was deployed with; the CLI
//! overrides them from flags or `SNOWFLAKE_*` environment variables.

use std::time::Duration;

use crate::error::{Result, TranslatorError};

pub const API_ENDPOINT: &str = "/api/v2/cortex/agent:run";
pub const API_TIMEOUT_MS: u64 = 50_000;
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet";
pub const RESPONSE_INSTRUCTION: &str = "You will always maintain a serious tone and provide concise response, you will always refer the user as Agent.";
pub const SEMANTIC_MODEL_FILE: &str =
    "@hive_to_sf_mgn.function_translator.STAGE/hive_to_sf_func_translator.yaml";
pub const SEARCH_SERVICE: &str = "HIVE_TO_SF_MGN.FUNCTION_TRANSLATOR.HIVE_TO_SF_TRANSLATOR";
pub const SEARCH_ID_COLUMN: &str = "function_mapping_id";
pub const ANALYST_TOOL_NAME: &str = "analyst1";
pub const SEARCH_TOOL_NAME: &str = "search1";

/// Search results requested for each chat turn.
pub const TURN_SEARCH_LIMIT: usize = 1;

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub user: String,
    pub password: String,
    pub account: String,
    pub role: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
}

impl ConnectionSettings {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("user", &self.user),
            ("password", &self.password),
            ("account", &self.account),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(TranslatorError::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Base URL of the account's REST API.
    pub fn base_url(&self) -> String {
        format!("https://{}.snowflakecomputing.com", self.account)
    }
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub response_instruction: String,
    pub semantic_model_file: String,
    pub search_service: String,
    pub id_column: String,
    pub turn_limit: usize,
    pub timeout: Duration,
    /// Print generated SQL before its results.
    pub show_sql: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            response_instruction: RESPONSE_INSTRUCTION.to_string(),
            semantic_model_file: SEMANTIC_MODEL_FILE.to_string(),
            search_service: SEARCH_SERVICE.to_string(),
            id_column: SEARCH_ID_COLUMN.to_string(),
            turn_limit: TURN_SEARCH_LIMIT,
            timeout: Duration::from_millis(API_TIMEOUT_MS),
            show_sql: false,
        }
    }
}

impl AgentSettings {
    pub fn validate(&self) -> Result<()> {
        if self.turn_limit == 0 {
            return Err(TranslatorError::Config(
                "search limit must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(TranslatorError::Config(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
