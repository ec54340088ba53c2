use thiserror::Error;

/// Error taxonomy shared by every layer of the P2P core.
///
/// The split between [`P2pError::Rejected`] and [`P2pError::Disconnected`] is
/// load-bearing: `Rejected` means the supplicant answered with a failure
/// status and the session is still usable, `Disconnected` means the transport
/// died and nothing works until the HAL is re-initialized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum P2pError {
    /// Local validation failure. The request never reached the HAL.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The supplicant reported a status failure. The session stays alive and
    /// the operation may be retried.
    #[error("rejected by supplicant: {0}")]
    Rejected(String),

    /// Transport-level fault or HAL death. The session is torn down.
    #[error("supplicant connection lost")]
    Disconnected,

    /// The command arrived in a state that forbids it.
    #[error("busy: {0}")]
    Busy(String),

    /// The device does not support the requested feature.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type P2pResult<T> = Result<T, P2pError>;

impl P2pError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        P2pError::InvalidArgument(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        P2pError::Busy(msg.into())
    }
}
