//! The connection pool, filesystem facade, retry engine and metadata cache
//! used to mount a remote share.

pub mod cache;
pub mod config;
pub mod error;
pub mod fs;
pub mod pool;
pub mod retry;
pub mod transport;

pub use cache::MetadataCache;
pub use config::{CacheConfig, ClientConfig, RetryPolicy};
pub use error::ClientError;
pub use fs::{ClientFs, File, OpenFlags};
pub use pool::{ConnectionPool, PooledConnection};
pub use retry::retry;
pub use transport::{ConnectionFactory, InMemoryConnectionFactory, RemoteConnection, RemoteFile, TcpConnectionFactory};
