//! The client-side error taxonomy.
//!
//! Where the server speaks [`crate::protocol::status::NTStatus`] on the
//! wire, the client façade surfaces errors in POSIX-filesystem shape so a
//! caller can match on them the way it would match on `std::io::ErrorKind`
//! against a local mountpoint.

use thiserror::Error;

/// Errors the client connection pool and filesystem facade can produce.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The supplied [`crate::client::config::ClientConfig`] (or connection
    /// string) is malformed; raised before any I/O is attempted.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    /// A path was empty, contained a NUL byte, or escaped the share root via
    /// `..`.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The pooled connection (or the pool itself) is no longer usable.
    #[error("connection closed")]
    ConnectionClosed,

    /// No connection became available within the pool's wait timeout.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// The server rejected the NTLM handshake.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The server does not support any dialect this client offers.
    #[error("unsupported dialect")]
    UnsupportedDialect,

    /// A lower-level transport failure (dial timeout, reset, short read).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A path-scoped operation failed; `op` is a short POSIX-style verb
    /// ("open", "stat", "rename", ...), `path` the path involved.
    #[error("{op} {path}: {source}")]
    Path { op: &'static str, path: String, #[source] source: Box<ClientError> },

    /// Standard filesystem-style errors, mirroring `std::io::ErrorKind` so
    /// callers used to local filesystem semantics see familiar shapes.
    #[error("no such file or directory")]
    NotExist,
    #[error("file already exists")]
    Exist,
    #[error("permission denied")]
    Permission,
    #[error("invalid argument")]
    Invalid,
    #[error("use of closed file")]
    Closed,
}

impl ClientError {
    /// Wraps `self` as a path-scoped error for `op` against `path`.
    pub fn at_path(self, op: &'static str, path: impl Into<String>) -> ClientError {
        ClientError::Path { op, path: path.into(), source: Box::new(self) }
    }

    /// The client's `convertError`: collapses the taxonomy's internal
    /// variants down to the standard filesystem-style errors a caller
    /// matches on, leaving everything else unchanged.
    pub fn converted(self) -> ClientError {
        match self {
            ClientError::ConnectionClosed => ClientError::Closed,
            ClientError::InvalidPath(_) => ClientError::Invalid,
            ClientError::AuthenticationFailed => ClientError::Permission,
            other => other,
        }
    }

    /// Whether the retry engine (`crate::client::retry`) should attempt this
    /// operation again: transient network errors, a closed pooled
    /// connection, or a momentarily exhausted pool.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::ConnectionClosed | ClientError::PoolExhausted => true,
            ClientError::Transport(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            ClientError::Path { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether this error (including one wrapped in a [`ClientError::Path`])
    /// is the "already exists" case, the way callers like `mkdirall` need to
    /// tolerate it.
    pub fn is_exist(&self) -> bool {
        match self {
            ClientError::Exist => true,
            ClientError::Path { source, .. } => source.is_exist(),
            _ => false,
        }
    }

    /// Whether this error (including one wrapped in a [`ClientError::Path`])
    /// is the "does not exist" case, the way callers like `removeall` need to
    /// tolerate it.
    pub fn is_not_exist(&self) -> bool {
        match self {
            ClientError::NotExist => true,
            ClientError::Path { source, .. } => source.is_not_exist(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_error_maps_the_documented_triples() {
        assert!(matches!(ClientError::ConnectionClosed.converted(), ClientError::Closed));
        assert!(matches!(ClientError::InvalidPath("x".into()).converted(), ClientError::Invalid));
        assert!(matches!(ClientError::AuthenticationFailed.converted(), ClientError::Permission));
    }

    #[test]
    fn convert_error_passes_other_variants_through() {
        assert!(matches!(ClientError::PoolExhausted.converted(), ClientError::PoolExhausted));
    }

    #[test]
    fn pool_exhausted_and_connection_closed_are_retryable() {
        assert!(ClientError::PoolExhausted.is_retryable());
        assert!(ClientError::ConnectionClosed.is_retryable());
        assert!(!ClientError::InvalidConfig("x".into()).is_retryable());
        assert!(!ClientError::NotExist.is_retryable());
    }

    #[test]
    fn path_errors_inherit_their_source_s_retryability() {
        let wrapped = ClientError::PoolExhausted.at_path("open", "/a/b");
        assert!(wrapped.is_retryable());
        let wrapped = ClientError::NotExist.at_path("open", "/a/b");
        assert!(!wrapped.is_retryable());
    }

    #[test]
    fn exist_and_not_exist_are_recognized_through_a_path_wrapper() {
        assert!(ClientError::Exist.at_path("mkdir", "/a").is_exist());
        assert!(ClientError::NotExist.at_path("remove", "/a").is_not_exist());
        assert!(!ClientError::Exist.at_path("mkdir", "/a").is_not_exist());
    }

    #[test]
    fn transport_timeouts_are_retryable_but_other_io_errors_are_not() {
        let timeout = ClientError::Transport(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(timeout.is_retryable());
        let other = ClientError::Transport(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(!other.is_retryable());
    }
}
