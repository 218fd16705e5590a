use thiserror::Error;

use crate::key_template::TemplateError;
use crate::writer::TransportError;

/// Publisher construction failure; fatal at process start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("unknown sasl mechanism '{0}'")]
    UnknownMechanism(String),

    #[error("unknown sasl algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("parse key template: {0}")]
    KeyTemplate(#[from] TemplateError),

    #[error("kafka client: {0}")]
    Client(String),
}

/// Failure to deliver one notification. Logged only; the mutation stands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("publish queue is full")]
    QueueFull,

    #[error("publisher is shutting down")]
    ShuttingDown,
}
