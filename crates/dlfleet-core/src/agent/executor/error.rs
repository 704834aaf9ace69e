//! Fetch failures. The `Display` text is the message published on a
//! `Failed` progress event.

/// Why a download did not complete.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Curl reported an error (timeout, connection, etc.).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Final response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Transfer was stopped because the agent is shutting down.
    #[error("download cancelled")]
    Cancelled,
    /// The blocking transfer task panicked or was aborted.
    #[error("download task failed: {0}")]
    Task(String),
}

/// Failure category attached to the `download failed` log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connection,
    HttpStatus,
    Cancelled,
    Other,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Curl(e) if e.is_operation_timedout() => FailureKind::Timeout,
            FetchError::Curl(e)
                if e.is_couldnt_connect()
                    || e.is_couldnt_resolve_host()
                    || e.is_couldnt_resolve_proxy()
                    || e.is_recv_error()
                    || e.is_send_error()
                    || e.is_got_nothing()
                    || e.is_partial_file() =>
            {
                FailureKind::Connection
            }
            FetchError::Http(_) => FailureKind::HttpStatus,
            FetchError::Cancelled => FailureKind::Cancelled,
            FetchError::Curl(_) | FetchError::Task(_) => FailureKind::Other,
        }
    }
}
