//! Transcript records.
//!
//! A [`Transcript`] is one conversation. It is written once and never
//! updated in place; a changed conversation is stored under a new id.
//! [`TranscriptInfo`] is the same record without its content, which is what
//! listing and filtering operate on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::schema::is_reserved_column;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call requested by an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: String,
    #[serde(default)]
    pub arguments: Value,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Transcript fields without content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TranscriptInfo {
    pub transcript_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TranscriptInfo {
    pub fn new(transcript_id: impl Into<String>) -> Self {
        TranscriptInfo {
            transcript_id: transcript_id.into(),
            ..Default::default()
        }
    }

    /// Attach content, producing a full transcript.
    pub fn with_content(self, messages: Vec<ChatMessage>, events: Vec<Event>) -> Transcript {
        Transcript {
            info: self,
            messages,
            events,
        }
    }

    /// Check the invariants required before a row may be written.
    ///
    /// Metadata keys are flattened into columns next to the fixed fields, so a
    /// key that reuses a reserved column name, in any letter case, is rejected
    /// instead of shadowing it.
    pub fn validate(&self) -> Result<()> {
        if self.transcript_id.is_empty() {
            return Err(Error::EmptyTranscriptId);
        }
        if let Some(key) = self.metadata.keys().find(|k| is_reserved_column(k)) {
            return Err(Error::ReservedMetadataKey { key: key.clone() });
        }
        Ok(())
    }
}

/// A complete conversation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(flatten)]
    pub info: TranscriptInfo,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Transcript {
    pub fn new(transcript_id: impl Into<String>) -> Self {
        TranscriptInfo::new(transcript_id).with_content(Vec::new(), Vec::new())
    }

    pub fn id(&self) -> &str {
        &self.info.transcript_id
    }

    /// Projection without content.
    pub fn info(&self) -> &TranscriptInfo {
        &self.info
    }

    pub fn into_info(self) -> TranscriptInfo {
        self.info
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.info.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.info.validate()
    }
}
