use std::sync::Arc;

use ocs_proto::coding::DecodeError;
use ocs_proto::{InvalidId, Timestamp};

use crate::SessionState;

/// Every failure reported by the client, synchronously or through the message queue.
#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
	#[error("{operation} is not valid while {state}")]
	InvalidState {
		operation: &'static str,
		state: SessionState,
	},

	#[error("invalid address: {0:?}")]
	InvalidAddress(String),

	#[error("invalid port: {0}")]
	InvalidPort(u16),

	#[error("invalid id: {0}")]
	InvalidId(#[from] InvalidId),

	#[error("stale batch: expected {expected}, got {got}")]
	StaleBatch { expected: Timestamp, got: Timestamp },

	#[error("no batch in progress")]
	NoBatch,

	#[error("closed")]
	Closed,

	#[error("send buffer full")]
	Full,

	#[error("closed by host: {0}")]
	Remote(String),

	#[error("transport error: {0}")]
	Transport(Arc<anyhow::Error>),

	#[error("decode error: {0}")]
	Decode(#[from] DecodeError),

	#[error("decode failed: {0}")]
	DecodeFailed(Arc<anyhow::Error>),

	#[error("config error: {0}")]
	Config(Arc<serde_json::Error>),

	#[error("runtime error: {0}")]
	Runtime(Arc<std::io::Error>),

	#[error("timeout")]
	Timeout,
}

impl Error {
	pub(crate) fn transport(err: anyhow::Error) -> Self {
		Self::Transport(Arc::new(err))
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::Config(Arc::new(err))
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
