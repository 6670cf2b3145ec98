//! Chat front-end that answers Hive → Snowflake function conversion
//! questions through a Cortex agent.
//!
//! A turn goes through [`router::process_turn`]: the question is sent to the
//! agent ([`agents`]), the streamed events are reduced to text, SQL and
//! citations ([`extract`]), and the keyword intent of the question decides
//! which follow-up lookups run against Snowflake ([`engine`]).

pub mod agents;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod extract;
pub mod router;
pub mod surface;

#[cfg(test)]
mod test_support;

pub use agents::{AgentClient, AgentResponse, AgentService};
pub use config::{AgentSettings, ConnectionSettings};
pub use conversation::{Conversation, Message, Role};
pub use engine::{QueryTable, SnowflakeEngine, SqlBackend};
pub use error::{Result, TranslatorError};
pub use extract::{extract_response, Citation, ExtractionResult};
pub use router::{classify_intent, process_turn, Intent, TurnOutcome};
pub use surface::{ChatSurface, TerminalSurface};
