//! tscribe common types, file identities, and errors.
//!
//! This crate provides foundational types shared across the tscribe crates:
//! - The transcript data model (transcripts, messages, events)
//! - Sortable, collision-free file identities for data and index files
//! - Reserved column names and schema versioning
//! - Common error types

pub mod error;
pub mod event;
pub mod id;
pub mod schema;
pub mod transcript;

pub use error::{Error, Result};
pub use event::{Event, InfoEvent, ModelEvent, SpanBeginEvent, SpanEndEvent, ToolEvent};
pub use id::{new_transcript_id, FileKind, FileStamp};
pub use schema::{is_reserved_column, RESERVED_COLUMNS, SCHEMA_VERSION};
pub use transcript::{ChatMessage, MessageRole, ToolCall, Transcript, TranscriptInfo};
