use std::collections::BTreeMap;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::{
    AgentSettings, ConnectionSettings, ANALYST_TOOL_NAME, API_ENDPOINT, SEARCH_TOOL_NAME,
};
use crate::error::{Result, TranslatorError};

pub const USER_AGENT: &str = "Hive-SF-Translator/0.1.0";
pub const EVENT_MESSAGE_DELTA: &str = "message.delta";
pub const ANALYST_TOOL_TYPE: &str = "cortex_analyst_text_to_sql";
pub const SEARCH_TOOL_TYPE: &str = "cortex_search";

// ============================================================================
// Request Types (agent:run payload)
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AgentMessage {
    pub role: String,
    pub content: Vec<ContentItem>,
}

impl AgentMessage {
    pub fn user_text(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: vec![ContentItem {
                content_type: "text".to_string(),
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tool {
    pub tool_spec: ToolSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub name: String,
}

impl Tool {
    pub fn new(tool_type: &str, name: &str) -> Self {
        Self {
            tool_spec: ToolSpec {
                tool_type: tool_type.to_string(),
                name: name.to_string(),
            },
        }
    }
}

/// Per-tool configuration, keyed by tool name in the request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ToolResource {
    Analyst {
        semantic_model_file: String,
    },
    Search {
        name: String,
        max_results: usize,
        id_column: String,
    },
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AgentRequest {
    pub model: String,
    #[serde(rename = "response-instruction")]
    pub response_instruction: String,
    pub messages: Vec<AgentMessage>,
    pub tools: Vec<Tool>,
    pub tool_resources: BTreeMap<String, ToolResource>,
}

impl AgentRequest {
    /// Single-turn request binding the analyst and search tools.
    pub fn for_query(settings: &AgentSettings, query: &str, limit: usize) -> Self {
        let mut tool_resources = BTreeMap::new();
        tool_resources.insert(
            ANALYST_TOOL_NAME.to_string(),
            ToolResource::Analyst {
                semantic_model_file: settings.semantic_model_file.clone(),
            },
        );
        tool_resources.insert(
            SEARCH_TOOL_NAME.to_string(),
            ToolResource::Search {
                name: settings.search_service.clone(),
                max_results: limit,
                id_column: settings.id_column.clone(),
            },
        );

        Self {
            model: settings.model.clone(),
            response_instruction: settings.response_instruction.clone(),
            messages: vec![AgentMessage::user_text(query)],
            tools: vec![
                Tool::new(ANALYST_TOOL_TYPE, ANALYST_TOOL_NAME),
                Tool::new(SEARCH_TOOL_TYPE, SEARCH_TOOL_NAME),
            ],
            tool_resources,
        }
    }
}

// ============================================================================
// Response Types (event stream)
// ============================================================================

/// One server-sent event. `data` stays raw so a malformed payload only
/// fails when something actually reads it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentEvent {
    pub event: String,
    pub data: Value,
}

impl AgentEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Non-object entries carry no kind and are ignored downstream.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => Self {
                event: map
                    .remove("event")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                data: map.remove("data").unwrap_or(Value::Null),
            },
            _ => Self::default(),
        }
    }

    pub fn is_delta(&self) -> bool {
        self.event == EVENT_MESSAGE_DELTA
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeltaData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: Delta,
}

/// Content items stay raw until read so one bad item cannot hide its
/// neighbours.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<Value>,
}

impl Delta {
    /// Decodes content items in arrival order. Items without a `type` tag are
    /// skipped; a known kind with a malformed payload is an error.
    pub fn items(&self) -> impl Iterator<Item = Result<DeltaContent>> + '_ {
        self.content.iter().filter_map(DeltaContent::decode)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum DeltaContent {
    #[serde(rename = "text")]
    Text {
        #[serde(default, deserialize_with = "null_as_default")]
        text: String,
    },
    #[serde(rename = "tool_results")]
    ToolResults {
        #[serde(default, deserialize_with = "null_as_default")]
        tool_results: ToolResults,
    },
    #[serde(other)]
    Other,
}

impl DeltaContent {
    fn decode(raw: &Value) -> Option<Result<Self>> {
        let kind = raw.get("type").and_then(Value::as_str)?;
        Some(match kind {
            "text" | "tool_results" => Self::deserialize(raw)
                .map_err(|e| TranslatorError::Event(format!("malformed {kind} item: {e}"))),
            _ => Ok(Self::Other),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolResults {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<ToolResultEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolResultEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub json: ToolResultJson,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolResultJson {
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(
        default,
        rename = "searchResults",
        deserialize_with = "null_as_default"
    )]
    pub search_results: Vec<SearchResult>,
}

/// Ids arrive as strings or as bare numbers; both are kept as text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResult {
    #[serde(default, deserialize_with = "id_as_string")]
    pub source_id: String,
    #[serde(default, deserialize_with = "id_as_string")]
    pub doc_id: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string or numeric id, got {other}"
        ))),
    }
}

/// What the agent endpoint handed back on a successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentResponse {
    Events(Vec<AgentEvent>),
    /// Body decoded to something other than an event sequence.
    Text(String),
}

/// Decodes a JSON body. Arrays are event sequences; anything else is text.
pub fn parse_json_body(body: &str) -> Result<AgentResponse> {
    let value: Value = serde_json::from_str(body)?;
    Ok(match value {
        Value::Array(items) => {
            AgentResponse::Events(items.into_iter().map(AgentEvent::from_value).collect())
        }
        Value::String(text) => AgentResponse::Text(text),
        other => {
            tracing::warn!("agent returned a non-sequence body");
            AgentResponse::Text(other.to_string())
        }
    })
}

/// Collects an SSE byte stream into events, dropping `[DONE]` markers.
pub async fn collect_event_stream<S, B, E>(stream: S) -> Result<Vec<AgentEvent>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut events = Box::pin(stream.eventsource());
    let mut collected = Vec::new();

    while let Some(frame) = events.next().await {
        let frame = frame.map_err(|e| TranslatorError::Stream(e.to_string()))?;
        if frame.data == "[DONE]" {
            continue;
        }
        tracing::trace!(event = %frame.event, data = %frame.data, "sse frame");
        let data = serde_json::from_str(&frame.data).unwrap_or(Value::String(frame.data));
        collected.push(AgentEvent::new(frame.event, data));
    }

    Ok(collected)
}

// ============================================================================
// Client Implementation
// ============================================================================

#[async_trait]
pub trait AgentService: Send + Sync {
    async fn run(&self, query: &str, limit: usize) -> Result<AgentResponse>;
}

#[derive(Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    url: String,
    token: String,
    database: String,
    schema: String,
    settings: AgentSettings,
}

impl AgentClient {
    pub fn new(connection: &ConnectionSettings, settings: AgentSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            url: format!("{}{}", connection.base_url(), API_ENDPOINT),
            token: connection.password.clone(),
            database: connection.database.clone(),
            schema: connection.schema.clone(),
            settings,
        })
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }
}

#[async_trait]
impl AgentService for AgentClient {
    async fn run(&self, query: &str, limit: usize) -> Result<AgentResponse> {
        let request_body = AgentRequest::for_query(&self.settings, query, limit);
        if tracing::enabled!(tracing::Level::TRACE) {
            let pretty = serde_json::to_string_pretty(&request_body)?;
            tracing::trace!("agent request body:\n{}", pretty);
        }
        tracing::debug!(url = %self.url, model = %request_body.model, limit, "calling agent");

        let response = self
            .http
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .header("X-Snowflake-Database", &self.database)
            .header("X-Snowflake-Schema", &self.schema)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown reason")
                    .to_string()
            } else {
                body
            };
            return Err(TranslatorError::Status {
                status: status.as_u16(),
                reason,
            });
        }

        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/event-stream"));

        if is_event_stream {
            let events = collect_event_stream(response.bytes_stream()).await?;
            tracing::debug!(events = events.len(), "agent stream finished");
            Ok(AgentResponse::Events(events))
        } else {
            let body = response.text().await?;
            parse_json_body(&body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_payload_matches_agent_schema() {
        let settings = AgentSettings::default();
        let request = AgentRequest::for_query(&settings, "What replaces NVL?", 1);
        let payload = serde_json::to_value(&request).unwrap();

        assert_eq!(
            payload,
            json!({
                "model": "claude-3-5-sonnet",
                "response-instruction": settings.response_instruction,
                "messages": [
                    {"role": "user", "content": [{"type": "text", "text": "What replaces NVL?"}]}
                ],
                "tools": [
                    {"tool_spec": {"type": "cortex_analyst_text_to_sql", "name": "analyst1"}},
                    {"tool_spec": {"type": "cortex_search", "name": "search1"}}
                ],
                "tool_resources": {
                    "analyst1": {"semantic_model_file": settings.semantic_model_file},
                    "search1": {
                        "name": settings.search_service,
                        "max_results": 1,
                        "id_column": "function_mapping_id"
                    }
                }
            })
        );
    }

    #[test]
    fn json_array_body_becomes_events() {
        let body = r#"[
            {"event": "message.delta", "data": {"delta": {"content": []}}},
            {"event": "done"},
            42
        ]"#;
        let AgentResponse::Events(events) = parse_json_body(body).unwrap() else {
            panic!("expected events");
        };
        assert_eq!(events.len(), 3);
        assert!(events[0].is_delta());
        assert_eq!(events[1].event, "done");
        assert_eq!(events[1].data, Value::Null);
        assert_eq!(events[2], AgentEvent::default());
    }

    #[test]
    fn string_body_is_text() {
        assert_eq!(
            parse_json_body(r#""Request timed out""#).unwrap(),
            AgentResponse::Text("Request timed out".to_string())
        );
        assert!(matches!(
            parse_json_body(r#"{"message": "bad"}"#).unwrap(),
            AgentResponse::Text(_)
        ));
        assert!(matches!(
            parse_json_body("not json"),
            Err(TranslatorError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn sse_frames_are_collected_in_order() {
        let raw = concat!(
            "event: response.status\n",
            "data: {\"status\": \"planning\"}\n\n",
            "event: message.delta\n",
            "data: {\"id\": \"m1\", \"delta\": {\"content\": [{\"type\": \"text\", \"text\": \"Hi\"}]}}\n\n",
            "event: done\n",
            "data: [DONE]\n\n",
            "event: message.delta\n",
            "data: not-json\n\n",
        );
        // split mid-frame to exercise reassembly
        let (a, b) = raw.split_at(40);
        let chunks = vec![
            Ok::<_, std::io::Error>(a.as_bytes().to_vec()),
            Ok(b.as_bytes().to_vec()),
        ];

        let events = collect_event_stream(futures::stream::iter(chunks))
            .await
            .unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event, "response.status");
        assert!(events[1].is_delta());
        assert_eq!(events[1].data["delta"]["content"][0]["text"], "Hi");
        assert_eq!(events[2].data, Value::String("not-json".to_string()));
    }

    #[test]
    fn delta_content_decodes_defensively() {
        let data: DeltaData = serde_json::from_value(json!({
            "delta": {"content": [
                {"type": "text"},
                {"type": "chart", "chart": {}},
                {"text": "no type tag"},
                {"type": "tool_results", "tool_results": {"content": [
                    {"json": {"sql": "SELECT 1", "searchResults": [{"doc_id": "FM_1", "extra": true}]}},
                    {}
                ]}}
            ]}
        }))
        .unwrap();

        let content: Vec<DeltaContent> = data.delta.items().collect::<Result<_>>().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0], DeltaContent::Text { text: String::new() });
        assert_eq!(content[1], DeltaContent::Other);
        let DeltaContent::ToolResults { tool_results } = &content[2] else {
            panic!("expected tool results");
        };
        assert_eq!(tool_results.content.len(), 2);
        assert_eq!(tool_results.content[0].json.sql.as_deref(), Some("SELECT 1"));
        assert_eq!(tool_results.content[0].json.search_results[0].doc_id, "FM_1");
        assert_eq!(tool_results.content[0].json.search_results[0].source_id, "");
        assert!(tool_results.content[1].json.sql.is_none());
    }

    #[test]
    fn numeric_ids_and_null_collections_decode() {
        let item = json!({"type": "tool_results", "tool_results": {"content": [
            {"json": {"sql": "SELECT 1", "searchResults": [{"source_id": 1, "doc_id": 42}]}},
            {"json": {"sql": "SELECT 2", "text": null, "searchResults": null}},
            {"json": null}
        ]}});

        let Some(Ok(DeltaContent::ToolResults { tool_results })) = DeltaContent::decode(&item)
        else {
            panic!("expected tool results");
        };
        let first = &tool_results.content[0].json;
        assert_eq!(first.search_results[0].source_id, "1");
        assert_eq!(first.search_results[0].doc_id, "42");
        assert!(tool_results.content[1].json.search_results.is_empty());
        assert!(tool_results.content[1].json.text.is_none());
        assert_eq!(tool_results.content[2].json, ToolResultJson::default());
    }

    #[test]
    fn malformed_known_item_is_an_error() {
        let bad_text = json!({"type": "text", "text": ["not", "a", "string"]});
        let bad_id = json!({"type": "tool_results", "tool_results": {"content": [
            {"json": {"searchResults": [{"source_id": {"nested": true}, "doc_id": "FM_1"}]}}
        ]}});

        for item in [bad_text, bad_id] {
            assert!(matches!(
                DeltaContent::decode(&item),
                Some(Err(TranslatorError::Event(_)))
            ));
        }
        assert!(DeltaContent::decode(&json!({"text": "no type tag"})).is_none());
        assert!(DeltaContent::decode(&json!("bare string")).is_none());
    }

    #[test]
    fn client_targets_agent_run_endpoint() {
        let connection = ConnectionSettings {
            user: "u".into(),
            password: "token".into(),
            account: "acme-xy123".into(),
            role: "R".into(),
            warehouse: "W".into(),
            database: "D".into(),
            schema: "S".into(),
        };
        let client = AgentClient::new(&connection, AgentSettings::default()).unwrap();
        assert_eq!(
            client.url,
            "https://acme-xy123.snowflakecomputing.com/api/v2/cortex/agent:run"
        );
    }
}
