use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::{
    command::{Command, Reply},
    connection::{Connection, StoreError},
};

pub const DEFAULT_MAX_IDLE: usize = 10;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(240);

/// A bounded set of idle store connections shared across requests.
#[derive(Debug)]
pub struct Pool {
    addr: String,
    max_idle: usize,
    idle_timeout: Duration,
    idle: Mutex<Vec<IdleConnection>>,
}

#[derive(Debug)]
struct IdleConnection {
    conn: Connection,
    since: Instant,
}

impl Pool {
    pub fn new(addr: impl Into<String>, max_idle: usize, idle_timeout: Duration) -> Arc<Self> {
        Arc::new(Pool {
            addr: addr.into(),
            max_idle,
            idle_timeout,
            idle: Mutex::new(Vec::with_capacity(max_idle)),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Borrow a connection, reusing the most recently returned idle one if it
    /// hasn't sat unused for longer than the idle timeout.
    pub async fn get(self: &Arc<Self>) -> Result<PooledConnection, StoreError> {
        let reused = {
            let mut idle = self.lock_idle();
            idle.retain(|c| c.since.elapsed() <= self.idle_timeout);
            idle.pop()
        };
        let conn = match reused {
            Some(idle) => idle.conn,
            None => Connection::connect(&self.addr).await?,
        };
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            broken: false,
        })
    }

    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    fn put(&self, conn: Connection) {
        let mut idle = self.lock_idle();
        if idle.len() < self.max_idle {
            idle.push(IdleConnection {
                conn,
                since: Instant::now(),
            });
        }
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<IdleConnection>> {
        // Pushes and pops can't leave the list half-updated.
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A connection on loan from a [`Pool`]. It goes back to the pool when dropped,
/// unless an i/o or protocol error left it unusable, or a send was abandoned
/// before its reply was read.
#[derive(Debug)]
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<Pool>,
    broken: bool,
}

impl PooledConnection {
    pub async fn send(&mut self, command: &Command) -> Result<Reply, StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::Closed)?;
        // Stays set if this future is dropped mid-send.
        self.broken = true;
        let result = conn.send(command).await;
        self.broken = matches!(&result, Err(e) if e.is_fatal());
        result
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken {
                tracing::debug!("discarding broken store connection");
            } else {
                self.pool.put(conn);
            }
        }
    }
}
