//! A bounded pool of [`RemoteConnection`]s, mirroring the teacher's
//! session/open registries in spirit: a single mutex guards the shared
//! bookkeeping (the idle list, the open counter, the waiter queue), and no
//! lock is ever held across a network call.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::client::error::ClientError;
use crate::client::transport::{ConnectionFactory, RemoteConnection};

struct Idle {
    conn: Arc<dyn RemoteConnection>,
    last_used: Instant,
}

struct Inner {
    idle: VecDeque<Idle>,
    num_open: usize,
    waiters: VecDeque<oneshot::Sender<Arc<dyn RemoteConnection>>>,
    closed: bool,
}

/// A checked-out connection. Dropping it without calling
/// [`PooledConnection::release`] still returns the connection to the pool -
/// `release` only exists so callers that know the connection misbehaved can
/// choose not to put it back.
pub struct PooledConnection {
    conn: Option<Arc<dyn RemoteConnection>>,
    pool: Arc<ConnectionPool>,
}

impl PooledConnection {
    pub fn connection(&self) -> &Arc<dyn RemoteConnection> {
        self.conn.as_ref().expect("connection taken")
    }

    /// Returns the connection to the pool's idle set (or hands it straight
    /// to the oldest waiter), unless it's no longer healthy, in which case
    /// it's dropped instead.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn).await;
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move { pool.put(conn).await });
        }
    }
}

/// Bounded pool of mounted [`RemoteConnection`]s built by a
/// [`ConnectionFactory`], per `[4.J]`'s invariants: `num_open <= max_open`,
/// at most `max_idle` idle connections retained, FIFO waiters, and a
/// background sweep that closes connections idle past `idle_timeout`.
pub struct ConnectionPool {
    factory: Box<dyn ConnectionFactory>,
    max_open: usize,
    max_idle: usize,
    idle_timeout: Duration,
    conn_timeout: Duration,
    inner: Mutex<Inner>,
}

impl ConnectionPool {
    pub fn new(factory: Box<dyn ConnectionFactory>, max_open: usize, max_idle: usize, idle_timeout: Duration, conn_timeout: Duration) -> Arc<Self> {
        Arc::new(ConnectionPool {
            factory,
            max_open,
            max_idle,
            idle_timeout,
            conn_timeout,
            inner: Mutex::new(Inner { idle: VecDeque::new(), num_open: 0, waiters: VecDeque::new(), closed: false }),
        })
    }

    /// Spawns the background sweep that runs every `idle_timeout / 2` and
    /// closes idle connections whose `last_used` age exceeds `idle_timeout`.
    /// Callers own the returned handle's lifetime; dropping it does not stop
    /// the sweep, matching `tokio::spawn`'s usual detached-task semantics.
    pub fn spawn_idle_sweep(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        let period = (pool.idle_timeout / 2).max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                pool.sweep_idle().await;
            }
        })
    }

    async fn sweep_idle(&self) {
        let mut inner = self.inner.lock().await;
        let idle_timeout = self.idle_timeout;
        let before = inner.idle.len();
        inner.idle.retain(|entry| entry.last_used.elapsed() < idle_timeout);
        let closed = before - inner.idle.len();
        inner.num_open -= closed;
        if closed > 0 {
            debug!(closed, "idle sweep closed aged-out connections");
        }
    }

    /// Checks out a connection: reuses an idle one if available and still
    /// fresh, opens a new one if `num_open < max_open`, or waits in FIFO
    /// order until one frees up or `conn_timeout` elapses.
    pub async fn get(self: &Arc<Self>) -> Result<PooledConnection, ClientError> {
        loop {
            let waiter = {
                let mut inner = self.inner.lock().await;
                if inner.closed {
                    return Err(ClientError::ConnectionClosed);
                }

                while let Some(entry) = inner.idle.pop_front() {
                    if entry.last_used.elapsed() >= self.idle_timeout {
                        inner.num_open -= 1;
                        continue;
                    }
                    if !entry.conn.is_healthy() {
                        inner.num_open -= 1;
                        continue;
                    }
                    return Ok(PooledConnection { conn: Some(entry.conn), pool: self.clone() });
                }

                if inner.num_open < self.max_open {
                    inner.num_open += 1;
                    None
                } else {
                    let (tx, rx) = oneshot::channel();
                    inner.waiters.push_back(tx);
                    Some(rx)
                }
            };

            match waiter {
                None => match self.factory.connect().await {
                    Ok(conn) => return Ok(PooledConnection { conn: Some(Arc::from(conn)), pool: self.clone() }),
                    Err(err) => {
                        let mut inner = self.inner.lock().await;
                        inner.num_open -= 1;
                        return Err(err);
                    }
                },
                Some(rx) => match tokio::time::timeout(self.conn_timeout, rx).await {
                    Ok(Ok(conn)) => return Ok(PooledConnection { conn: Some(conn), pool: self.clone() }),
                    Ok(Err(_)) | Err(_) => return Err(ClientError::PoolExhausted),
                },
            }
        }
    }

    /// Returns `conn` to the pool: hands it to the oldest waiter if any,
    /// otherwise keeps it idle (up to `max_idle`) or closes it.
    async fn put(&self, conn: Arc<dyn RemoteConnection>) {
        let mut inner = self.inner.lock().await;
        if inner.closed || !conn.is_healthy() {
            inner.num_open = inner.num_open.saturating_sub(1);
            let _ = conn.close().await;
            return;
        }

        while let Some(waiter) = inner.waiters.pop_front() {
            match waiter.send(conn.clone()) {
                Ok(()) => return,
                Err(_) => continue,
            }
        }

        if inner.idle.len() < self.max_idle {
            inner.idle.push_back(Idle { conn, last_used: Instant::now() });
        } else {
            inner.num_open = inner.num_open.saturating_sub(1);
            let _ = conn.close().await;
        }
    }

    /// Closes the pool: no further `get` succeeds, every idle connection is
    /// closed, and every still-waiting `get` is woken with
    /// [`ClientError::PoolExhausted`] (dropping its sender has the same
    /// effect as the waiter's `recv` failing).
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        inner.waiters.clear();
        for entry in inner.idle.drain(..) {
            let _ = entry.conn.close().await;
        }
        inner.num_open = 0;
        warn!("connection pool closed");
    }

    pub async fn num_open(&self) -> usize {
        self.inner.lock().await.num_open
    }

    pub async fn num_idle(&self) -> usize {
        self.inner.lock().await.idle.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::InMemoryConnectionFactory;

    fn pool(max_open: usize, max_idle: usize) -> Arc<ConnectionPool> {
        ConnectionPool::new(Box::new(InMemoryConnectionFactory::new()), max_open, max_idle, Duration::from_secs(60), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn get_opens_up_to_max_open_then_blocks() {
        let pool = pool(1, 1);
        let a = pool.get().await.unwrap();
        assert_eq!(pool.num_open().await, 1);
        let result = pool.get().await;
        assert!(matches!(result, Err(ClientError::PoolExhausted)));
        drop(a);
    }

    #[tokio::test]
    async fn put_returns_a_connection_to_an_idle_waiter() {
        let pool = pool(1, 1);
        let conn = pool.get().await.unwrap();

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move { pool2.get().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        conn.release().await;
        let handed_off = waiter.await.unwrap();
        assert!(handed_off.is_ok());
    }

    #[tokio::test]
    async fn excess_idle_connections_beyond_max_idle_are_closed() {
        let pool = pool(2, 1);
        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        a.release().await;
        b.release().await;
        assert_eq!(pool.num_idle().await, 1);
        assert_eq!(pool.num_open().await, 1);
    }

    #[tokio::test]
    async fn get_on_a_closed_pool_fails_with_connection_closed() {
        let pool = pool(1, 1);
        pool.close().await;
        let result = pool.get().await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn idle_sweep_drops_connections_older_than_idle_timeout() {
        let pool = ConnectionPool::new(Box::new(InMemoryConnectionFactory::new()), 1, 1, Duration::from_millis(10), Duration::from_millis(200));
        let conn = pool.get().await.unwrap();
        conn.release().await;
        assert_eq!(pool.num_idle().await, 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.sweep_idle().await;
        assert_eq!(pool.num_idle().await, 0);
        assert_eq!(pool.num_open().await, 0);
    }
}
