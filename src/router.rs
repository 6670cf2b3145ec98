use tracing::Instrument;

use crate::agents::AgentService;
use crate::config::AgentSettings;
use crate::conversation::Conversation;
use crate::engine::{fetch_error_fix_suggestion, fetch_function_details, run_query, SqlBackend};
use crate::extract::{extract_response, ExtractionResult};
use crate::surface::ChatSurface;

const ALTERNATIVE_KEYWORDS: [&str; 3] = ["alternative", "equivalent", "replacement"];
const ERROR_KEYWORD: &str = "error";

/// Inline citation marker the agent leaves in free text.
pub const CITATION_MARKER: &str = "【†1†】";

pub const FUNCTION_DETAILS_HEADING: &str =
    "### The perfect Snowflake Function does exist. Below are the details:";
pub const SQL_RESULTS_HEADING: &str =
    "### As per the data engineer experts, we think below details can solve your problem";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Show the Snowflake function(s) matching a Hive function.
    AlternativeLookup,
    /// Look up the fix for a conversion error.
    ErrorFix,
    Fallback,
}

/// Keyword match on the lowercased query. Alternative lookups win over
/// error fixes when both match.
pub fn classify_intent(query: &str) -> Intent {
    let lowered = query.to_lowercase();
    if ALTERNATIVE_KEYWORDS.iter().any(|word| lowered.contains(word)) {
        Intent::AlternativeLookup
    } else if lowered.contains(ERROR_KEYWORD) {
        Intent::ErrorFix
    } else {
        Intent::Fallback
    }
}

pub fn strip_citation_marker(text: &str) -> String {
    text.replace(CITATION_MARKER, "")
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub intent: Intent,
    pub extraction: ExtractionResult,
}

impl TurnOutcome {
    pub fn generated_sql(&self) -> Option<&str> {
        Some(self.extraction.sql.as_str()).filter(|sql| !sql.is_empty())
    }
}

fn say(conversation: &mut Conversation, surface: &mut dyn ChatSurface, content: String) {
    let message = conversation.push_assistant(content);
    surface.message(message);
}

/// Applies the routing strategy for `intent` to an extraction and runs any
/// generated SQL.
pub async fn route_response(
    conversation: &mut Conversation,
    query: &str,
    extraction: &ExtractionResult,
    backend: &dyn SqlBackend,
    surface: &mut dyn ChatSurface,
    show_sql: bool,
) -> Intent {
    let intent = classify_intent(query);
    tracing::info!(
        ?intent,
        citations = extraction.citations.len(),
        has_sql = !extraction.sql.is_empty(),
        "routing response"
    );

    match intent {
        Intent::AlternativeLookup => {
            if !extraction.fallback_text.is_empty() {
                say(conversation, surface, extraction.fallback_text.clone());
            }
            if !extraction.citations.is_empty() {
                surface.heading(FUNCTION_DETAILS_HEADING);
                for citation in &extraction.citations {
                    if citation.doc_id.is_empty() {
                        continue;
                    }
                    match fetch_function_details(backend, &citation.doc_id, surface).await {
                        Some(details) => surface.table(&details),
                        None => tracing::debug!(doc_id = %citation.doc_id, "skipping citation"),
                    }
                }
            }
        }
        Intent::ErrorFix => {
            if let Some(first) = extraction.citations.first() {
                let suggestion = fetch_error_fix_suggestion(backend, &first.doc_id, surface).await;
                say(conversation, surface, suggestion);
            }
        }
        Intent::Fallback => {
            if !extraction.fallback_text.is_empty() {
                say(
                    conversation,
                    surface,
                    strip_citation_marker(&extraction.fallback_text),
                );
            }
        }
    }

    if !extraction.sql.is_empty() {
        if show_sql {
            surface.code("sql", &extraction.sql);
        }
        if let Some(table) = run_query(backend, &extraction.sql, surface).await {
            if !table.is_empty() {
                surface.heading(SQL_RESULTS_HEADING);
                surface.table(&table);
            }
        }
    }

    intent
}

/// One user turn: record the query, ask the agent, extract and route.
///
/// Returns `None` when the agent call failed; the failure has already been
/// shown on `surface`.
pub async fn process_turn(
    conversation: &mut Conversation,
    query: &str,
    agent: &dyn AgentService,
    backend: &dyn SqlBackend,
    surface: &mut dyn ChatSurface,
    settings: &AgentSettings,
) -> Option<TurnOutcome> {
    let span = tracing::info_span!("turn", conversation = %conversation.id());
    async move {
        conversation.push_user(query);

        let response = match agent.run(query, settings.turn_limit).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("agent call failed: {}", err);
                surface.error(&err.to_string());
                return None;
            }
        };

        let extraction = match extract_response(Some(&response)) {
            Ok(extraction) => extraction,
            Err(failure) => {
                tracing::warn!("extraction stopped early: {}", failure.error);
                surface.error(&failure.error.to_string());
                failure.partial
            }
        };

        let intent = route_response(
            conversation,
            query,
            &extraction,
            backend,
            surface,
            settings.show_sql,
        )
        .await;

        Some(TurnOutcome { intent, extraction })
    }
    .instrument(span)
    .await
}
