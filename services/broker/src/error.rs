//! Broker errors and their AMQP reply codes

use codec::{reply_code, ProtocolError};
use exchange::ExchangeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("NOT_FOUND - no queue '{0}'")]
    QueueNotFound(String),

    #[error("UNEXPECTED_FRAME - {0}")]
    UnexpectedFrame(String),

    #[error("COMMAND_INVALID - {0}")]
    CommandInvalid(String),

    #[error("CHANNEL_ERROR - {0}")]
    Channel(String),

    #[error("NOT_IMPLEMENTED - {0}")]
    NotImplemented(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrokerError {
    pub fn reply_code(&self) -> u16 {
        match self {
            BrokerError::Exchange(e) => e.reply_code(),
            BrokerError::QueueNotFound(_) => reply_code::NOT_FOUND,
            BrokerError::Protocol(e) if e.is_framing() => reply_code::FRAME_ERROR,
            BrokerError::UnexpectedFrame(_) => reply_code::UNEXPECTED_FRAME,
            BrokerError::CommandInvalid(_) => reply_code::COMMAND_INVALID,
            BrokerError::Channel(_) => reply_code::CHANNEL_ERROR,
            BrokerError::NotImplemented(_) => reply_code::NOT_IMPLEMENTED,
            BrokerError::Protocol(_) | BrokerError::Config(_) | BrokerError::Io(_) => {
                reply_code::INTERNAL_ERROR
            }
        }
    }

    /// Connection-level errors close the whole connection; the rest close
    /// only the channel the offending command arrived on
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            BrokerError::Protocol(_)
                | BrokerError::UnexpectedFrame(_)
                | BrokerError::CommandInvalid(_)
                | BrokerError::Channel(_)
                | BrokerError::NotImplemented(_)
                | BrokerError::Io(_)
        )
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_vs_connection_errors() {
        let not_found = BrokerError::QueueNotFound("q".into());
        assert_eq!(not_found.reply_code(), 404);
        assert!(!not_found.is_connection_error());

        let stray = BrokerError::UnexpectedFrame("content without publish".into());
        assert_eq!(stray.reply_code(), 505);
        assert!(stray.is_connection_error());

        let framing = BrokerError::from(ProtocolError::UnknownBodyType { tag: 9 });
        assert_eq!(framing.reply_code(), 501);
    }

    #[test]
    fn test_exchange_errors_keep_their_codes() {
        let err = BrokerError::from(ExchangeError::ReservedName("amq.x".into()));
        assert_eq!(err.reply_code(), 403);
        assert_eq!(err.to_string(), "ACCESS_REFUSED - exchange name 'amq.x' is reserved");
    }
}
