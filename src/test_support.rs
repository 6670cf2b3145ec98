//! Fakes for exercising turns without Snowflake.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::agents::{AgentResponse, AgentService};
use crate::conversation::Message;
use crate::engine::{QueryTable, SqlBackend};
use crate::error::{Result, TranslatorError};
use crate::surface::ChatSurface;

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Message(Message),
    Heading(String),
    Table(QueryTable),
    Code(String),
    Error(String),
}

#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub events: Vec<SurfaceEvent>,
}

impl RecordingSurface {
    pub fn errors(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Error(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tables(&self) -> Vec<&QueryTable> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Table(table) => Some(table),
                _ => None,
            })
            .collect()
    }
}

impl ChatSurface for RecordingSurface {
    fn message(&mut self, message: &Message) {
        self.events.push(SurfaceEvent::Message(message.clone()));
    }

    fn heading(&mut self, text: &str) {
        self.events.push(SurfaceEvent::Heading(text.to_string()));
    }

    fn table(&mut self, table: &QueryTable) {
        self.events.push(SurfaceEvent::Table(table.clone()));
    }

    fn code(&mut self, _language: &str, code: &str) {
        self.events.push(SurfaceEvent::Code(code.to_string()));
    }

    fn error(&mut self, text: &str) {
        self.events.push(SurfaceEvent::Error(text.to_string()));
    }
}

/// Answers every query by substring match on the SQL; unmatched queries
/// return an empty table.
#[derive(Debug, Default)]
pub struct FakeBackend {
    tables: Vec<(String, QueryTable)>,
    failures: Vec<String>,
    executed: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn with_table(mut self, marker: &str, table: QueryTable) -> Self {
        self.tables.push((marker.to_string(), table));
        self
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.failures.push(marker.to_string());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn executed_matching(&self, marker: &str) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter(|sql| sql.contains(marker))
            .collect()
    }
}

#[async_trait]
impl SqlBackend for FakeBackend {
    async fn query(&self, sql: &str) -> Result<QueryTable> {
        self.executed.lock().unwrap().push(sql.to_string());
        if let Some(marker) = self.failures.iter().find(|m| sql.contains(m.as_str())) {
            return Err(TranslatorError::Query(format!("table not found: {}", marker)));
        }
        Ok(self
            .tables
            .iter()
            .find(|(marker, _)| sql.contains(marker.as_str()))
            .map(|(_, table)| table.clone())
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
pub enum FakeReply {
    Response(AgentResponse),
    Status(u16, String),
    Stream(String),
}

#[derive(Debug)]
pub struct FakeAgent {
    reply: FakeReply,
    calls: Mutex<Vec<(String, usize)>>,
}

impl FakeAgent {
    pub fn new(reply: FakeReply) -> Self {
        Self {
            reply,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn responding(response: AgentResponse) -> Self {
        Self::new(FakeReply::Response(response))
    }

    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentService for FakeAgent {
    async fn run(&self, query: &str, limit: usize) -> Result<AgentResponse> {
        self.calls.lock().unwrap().push((query.to_string(), limit));
        match &self.reply {
            FakeReply::Response(response) => Ok(response.clone()),
            FakeReply::Status(status, reason) => Err(TranslatorError::Status {
                status: *status,
                reason: reason.clone(),
            }),
            FakeReply::Stream(reason) => Err(TranslatorError::Stream(reason.clone())),
        }
    }
}
