//! Errors raised while talking to a plugin process
use std::time::Duration;
use thiserror::Error;

pub use crate::greetings::UnknownGreeting;

#[derive(Debug, Error)]
pub enum PluginError {
    /// The command is not one of the fixed greetings; nothing was sent
    #[error(transparent)]
    UnknownGreeting(#[from] UnknownGreeting),

    #[error("failed to establish RPC connection over plugin pipes")]
    Connect(#[source] tonic::transport::Error),

    #[error("timed out after {0:?} establishing RPC connection over plugin pipes")]
    ConnectTimeout(Duration),

    /// The status message is rendered here, so the status is not a source
    #[error("RPC call failed: {}", .0.message())]
    Rpc(tonic::Status),

    #[error("RPC call timed out after {0:?}")]
    Timeout(Duration),

    #[error("RPC client is closed")]
    ClientClosed,
}

impl From<tonic::Status> for PluginError {
    fn from(status: tonic::Status) -> Self {
        PluginError::Rpc(status)
    }
}
