use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};
use thiserror::Error;

use crate::{
    command::{Command, Reply, SetCondition},
    connection::StoreError,
    pool::{Pool, PooledConnection},
};

pub const SERVICE_NAME: &str = "bingo-generator";

/// Key the number of the day is published under.
pub const KEY: &str = "bingoNumberOfTheDay";

/// How long a number of the day stays live.
pub const TTL: Duration = Duration::from_secs(86400);

const MIN_VALUE: u8 = 1;
const MAX_VALUE: u8 = 10;

/// How the generator claims the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// One `SET key value NX EX ttl`.
    #[default]
    Atomic,
    /// `EXISTS`, then `SET`, then `EXPIRE`. Concurrent triggers can both see
    /// the key as absent and overwrite each other.
    CheckThenSet,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "atomic" => Ok(Mode::Atomic),
            "check-then-set" => Ok(Mode::CheckThenSet),
            _ => Err(anyhow::format_err!("invalid mode {:?}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Generated(u8),
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("failed to connect to store: {0}")]
    Connect(StoreError),
    #[error("store authentication failed: {0}")]
    Auth(StoreError),
    #[error("existence check failed: {0}")]
    Exists(StoreError),
    #[error("failed to store bingoNumberOfTheDay: {0}")]
    Set(StoreError),
    #[error("failed to set expiry, bingoNumberOfTheDay left without expiry: {0}")]
    Expire(StoreError),
}

pub struct Generator {
    pool: Arc<Pool>,
    password: Option<String>,
    mode: Mode,
    rng: Mutex<StdRng>,
}

impl Generator {
    pub fn new(pool: Arc<Pool>, password: Option<String>, mode: Mode) -> Self {
        Self::with_rng(pool, password, mode, StdRng::from_entropy())
    }

    pub fn with_rng(pool: Arc<Pool>, password: Option<String>, mode: Mode, rng: StdRng) -> Self {
        Generator {
            pool,
            password,
            mode,
            rng: Mutex::new(rng),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Publish a new number of the day unless one is already live.
    #[tracing::instrument(
        name = "parent.request",
        skip(self),
        fields(service = SERVICE_NAME, resource = "redis")
    )]
    pub async fn trigger(&self) -> Result<Outcome, TriggerError> {
        let mut conn = self.pool.get().await.map_err(TriggerError::Connect)?;
        self.authenticate(&mut conn).await?;
        match self.mode {
            Mode::Atomic => self.set_if_absent(&mut conn).await,
            Mode::CheckThenSet => self.check_then_set(&mut conn).await,
        }
    }

    async fn authenticate(&self, conn: &mut PooledConnection) -> Result<(), TriggerError> {
        let Some(password) = &self.password else {
            return Ok(());
        };
        let reply = conn
            .send(&Command::Auth {
                password: password.clone(),
            })
            .await
            .map_err(TriggerError::Auth)?;
        if reply.is_ok() {
            Ok(())
        } else {
            Err(TriggerError::Auth(unexpected("AUTH", reply)))
        }
    }

    async fn set_if_absent(&self, conn: &mut PooledConnection) -> Result<Outcome, TriggerError> {
        let value = self.draw();
        let reply = conn
            .send(&Command::Set {
                key: KEY.to_string(),
                value: value.to_string(),
                condition: Some(SetCondition::IfAbsent),
                expiry: Some(TTL),
            })
            .await
            .map_err(TriggerError::Set)?;
        match reply {
            reply if reply.is_ok() => Ok(Outcome::Generated(value)),
            Reply::Bulk(None) => Ok(Outcome::AlreadyExists),
            reply => Err(TriggerError::Set(unexpected("SET", reply))),
        }
    }

    async fn check_then_set(&self, conn: &mut PooledConnection) -> Result<Outcome, TriggerError> {
        let exists = conn
            .send(&Command::Exists {
                key: KEY.to_string(),
            })
            .await
            .map_err(TriggerError::Exists)?;
        match exists {
            Reply::Integer(0) => {}
            Reply::Integer(_) => return Ok(Outcome::AlreadyExists),
            reply => return Err(TriggerError::Exists(unexpected("EXISTS", reply))),
        }

        let value = self.draw();
        let reply = conn
            .send(&Command::Set {
                key: KEY.to_string(),
                value: value.to_string(),
                condition: None,
                expiry: None,
            })
            .await
            .map_err(TriggerError::Set)?;
        if !reply.is_ok() {
            return Err(TriggerError::Set(unexpected("SET", reply)));
        }

        let reply = conn
            .send(&Command::Expire {
                key: KEY.to_string(),
                seconds: TTL.as_secs(),
            })
            .await
            .map_err(TriggerError::Expire)?;
        match reply {
            Reply::Integer(1) => Ok(Outcome::Generated(value)),
            reply => Err(TriggerError::Expire(unexpected("EXPIRE", reply))),
        }
    }

    fn draw(&self) -> u8 {
        self.rng
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .gen_range(MIN_VALUE..=MAX_VALUE)
    }
}

fn unexpected(command: &'static str, reply: Reply) -> StoreError {
    StoreError::UnexpectedReply { command, reply }
}
