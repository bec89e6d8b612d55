use alloy_primitives::B256;
use std::path::PathBuf;
use thiserror::Error;

use crate::status::StationStatus;

/// Coarse classification used by failover and status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Well-formed error response from a reachable node
    Protocol,
    /// Unreachable node, broken transport, or an unusable response
    Transport,
}

/// Errors returned by an upstream node client.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("block not found: {0}")]
    MissingBlock(String),

    #[error("inconsistent read: {0}")]
    InconsistentRead(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Rpc { .. } => ErrorKind::Protocol,
            _ => ErrorKind::Transport,
        }
    }
}

/// Errors from a single sync attempt.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    #[error("no full node client available")]
    ClusterUnavailable,

    #[error("pivot switched at epoch {epoch}: expected {expected}, got {actual}")]
    PivotSwitched {
        epoch: u64,
        expected: B256,
        actual: B256,
    },

    #[error("epoch {0} has no blocks")]
    EmptyEpoch(u64),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Client(e) => e.kind(),
            _ => ErrorKind::Transport,
        }
    }
}

/// Errors loading the full node cluster membership.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to read cluster file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid cluster file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid node url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Errors surfaced to callers asking for fee suggestions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SuggestError {
    #[error("gas station unavailable: {0}")]
    Unavailable(StationStatus),

    #[error(transparent)]
    Client(#[from] ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rpc_errors_as_protocol() {
        let err = ClientError::Rpc {
            code: -32602,
            message: "invalid params".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(SyncError::from(err).kind(), ErrorKind::Protocol);
    }

    #[test]
    fn everything_else_is_transport() {
        assert_eq!(ClientError::Transport("refused".into()).kind(), ErrorKind::Transport);
        assert_eq!(ClientError::MissingBlock("0x1".into()).kind(), ErrorKind::Transport);
        assert_eq!(SyncError::ClusterUnavailable.kind(), ErrorKind::Transport);
        let switched = SyncError::PivotSwitched {
            epoch: 7,
            expected: B256::ZERO,
            actual: B256::repeat_byte(1),
        };
        assert_eq!(switched.kind(), ErrorKind::Transport);
        assert_eq!(SyncError::EmptyEpoch(7).kind(), ErrorKind::Transport);
    }
}
