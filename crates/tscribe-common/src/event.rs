//! Transcript events.
//!
//! Events form a closed set. Importers that read loosely-typed traces map
//! them into one of these variants; anything without a dedicated field goes
//! into the per-event `metadata` bag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::transcript::ChatMessage;

/// One step recorded in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Model(ModelEvent),
    Tool(ToolEvent),
    SpanBegin(SpanBeginEvent),
    SpanEnd(SpanEndEvent),
    Info(InfoEvent),
}

impl Event {
    /// When the event happened, if recorded.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Event::Model(e) => e.timestamp,
            Event::Tool(e) => e.timestamp,
            Event::SpanBegin(e) => e.timestamp,
            Event::SpanEnd(e) => e.timestamp,
            Event::Info(e) => e.timestamp,
        }
    }

    /// Short name of the variant, matching the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Model(_) => "model",
            Event::Tool(_) => "tool",
            Event::SpanBegin(_) => "span_begin",
            Event::SpanEnd(_) => "span_end",
            Event::Info(_) => "info",
        }
    }
}

/// A single model generation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelEvent {
    pub model: String,
    #[serde(default)]
    pub input: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// A tool invocation and its outcome.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolEvent {
    pub id: String,
    pub function: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Start of a named span grouping later events.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpanBeginEvent {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// End of the span with the matching id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpanEndEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Free-form informational record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InfoEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}
