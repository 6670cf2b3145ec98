//! Turns the agent's event sequence into fallback text, generated SQL and
//! citations.

use serde::Deserialize;
use serde_json::Value;

use crate::agents::{AgentEvent, AgentResponse, DeltaContent, DeltaData, ToolResultJson};
use crate::error::TranslatorError;

/// Text items starting with this (lowercased) are the agent giving up.
const UNKNOWN_ANSWER_PREFIX: &str = "i don't know";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Citation {
    pub source_id: String,
    pub doc_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    pub fallback_text: String,
    pub sql: String,
    pub citations: Vec<Citation>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.fallback_text.is_empty() && self.sql.is_empty() && self.citations.is_empty()
    }
}

/// Extraction stopped early; `partial` holds everything gathered before it.
#[derive(Debug)]
pub struct PartialExtraction {
    pub partial: ExtractionResult,
    pub error: TranslatorError,
}

#[derive(Debug, Default)]
struct Accumulator {
    fragments: Vec<String>,
    sql: String,
    citations: Vec<Citation>,
}

impl Accumulator {
    fn absorb(&mut self, event: &AgentEvent) -> Result<(), TranslatorError> {
        if !event.is_delta() {
            return Ok(());
        }

        let data: DeltaData = match &event.data {
            Value::Null => DeltaData::default(),
            raw => DeltaData::deserialize(raw)
                .map_err(|e| TranslatorError::Event(e.to_string()))?,
        };

        for item in data.delta.items() {
            match item? {
                DeltaContent::ToolResults { tool_results } => {
                    for entry in &tool_results.content {
                        self.absorb_tool_result(&entry.json);
                    }
                }
                DeltaContent::Text { text } => {
                    if text.to_lowercase().starts_with(UNKNOWN_ANSWER_PREFIX) {
                        continue;
                    }
                    self.fragments.push(text);
                }
                DeltaContent::Other => {}
            }
        }
        Ok(())
    }

    fn absorb_tool_result(&mut self, json: &ToolResultJson) {
        if let Some(sql) = json.sql.as_deref().filter(|s| !s.is_empty()) {
            self.sql = sql.to_string();
        }
        if let Some(text) = json.text.as_deref().filter(|t| !t.is_empty()) {
            self.fragments.push(text.to_string());
        }
        self.citations
            .extend(json.search_results.iter().map(|result| Citation {
                source_id: result.source_id.clone(),
                doc_id: result.doc_id.clone(),
            }));
    }

    fn finish(self) -> ExtractionResult {
        ExtractionResult {
            fallback_text: self.fragments.join(" ").trim().to_string(),
            sql: self.sql,
            citations: self.citations,
        }
    }
}

/// Walks the events in arrival order. Absent or plain-text responses yield
/// the empty result.
pub fn extract_response(
    response: Option<&AgentResponse>,
) -> Result<ExtractionResult, PartialExtraction> {
    let events = match response {
        Some(AgentResponse::Events(events)) => events,
        Some(AgentResponse::Text(_)) | None => return Ok(ExtractionResult::default()),
    };

    let mut acc = Accumulator::default();
    for event in events {
        if let Err(error) = acc.absorb(event) {
            return Err(PartialExtraction {
                partial: acc.finish(),
                error,
            });
        }
    }
    Ok(acc.finish())
}
