//! Exchange management errors
//!
//! Routing itself never fails: an unroutable message is a zero match count.
//! These errors come from the management surface (declare, delete, bind) and
//! each maps onto the reply code a channel.close should carry.

use crate::ExchangeKind;
use codec::reply_code;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("NOT_FOUND - no exchange '{0}'")]
    NotFound(String),

    #[error("NOT_ALLOWED - cannot redeclare exchange '{name}' of type '{existing}' as '{requested}'")]
    AlreadyDeclared {
        name: String,
        existing: ExchangeKind,
        requested: ExchangeKind,
    },

    #[error("ACCESS_REFUSED - exchange name '{0}' is reserved")]
    ReservedName(String),

    #[error("COMMAND_INVALID - unknown exchange type '{0}'")]
    UnknownKind(String),

    #[error("PRECONDITION_FAILED - exchange '{name}' still has {bindings} bindings")]
    InUse { name: String, bindings: usize },

    #[error("PRECONDITION_FAILED - invalid argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },
}

impl ExchangeError {
    pub fn reply_code(&self) -> u16 {
        match self {
            ExchangeError::NotFound(_) => reply_code::NOT_FOUND,
            ExchangeError::AlreadyDeclared { .. } => reply_code::NOT_ALLOWED,
            ExchangeError::ReservedName(_) => reply_code::ACCESS_REFUSED,
            ExchangeError::UnknownKind(_) => reply_code::COMMAND_INVALID,
            ExchangeError::InUse { .. } | ExchangeError::InvalidArgument { .. } => {
                reply_code::PRECONDITION_FAILED
            }
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
