// Copyright 2025 Cornell University
// released under MIT License

use crate::ir::{ChannelName, Dir, Event};
use thiserror::Error;

/// Malformed protocol language text. Positions are 1-based, `span` holds
/// byte offsets into the parsed text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at line {line}, column {column}: {message}\n{snippet}")]
pub struct LanguageSyntaxError {
    pub message: String,
    pub span: (usize, usize),
    pub line: usize,
    pub column: usize,
    /// the offending line followed by a caret under the error position
    pub snippet: String,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Syntax(#[from] LanguageSyntaxError),

    /// A leaf of the language names a channel missing from the table
    #[error("the language expects {dir}put channel `{channel}`, which is not declared as an {dir}put")]
    UndeclaredChannel { dir: Dir, channel: ChannelName },

    #[error("{dir}put channel `{channel}` is declared more than once")]
    DuplicateChannel { dir: Dir, channel: ChannelName },

    #[error("{dir}put channel `{channel}` not found in protocol; known: [{}]", known.join(", "))]
    UnknownChannel {
        dir: Dir,
        channel: ChannelName,
        known: Vec<ChannelName>,
    },

    #[error("unexpected {event}: {reason}")]
    ProtocolViolation { event: Event, reason: String },

    #[error("node `{node}` has no handler for input channel `{channel}`")]
    MissingHandler { node: String, channel: ChannelName },

    #[error("unknown protocol `{name}`; known: [{}]", known.join(", "))]
    UnknownProtocol { name: String, known: Vec<String> },

    #[error("protocol `{0}` is defined more than once")]
    DuplicateProtocol(String),

    #[error("malformed channel translation `{entry}`: {reason}")]
    BadTranslation { entry: String, reason: String },

    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error("could not set config key `{key}`: {reason}")]
    Config { key: String, reason: String },

    #[error("{0}")]
    Diagnostics(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
