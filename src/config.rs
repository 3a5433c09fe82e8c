use std::{collections::HashMap, time::Duration};

use crate::{
    generator::Mode,
    pool::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_IDLE},
};

/// Environment variable holding the store credential.
pub const PASSWORD_VAR: &str = "REDIS_PASSWORD";

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_STORE_ADDR: &str = "redis-master:6379";

#[derive(Debug, Default)]
pub struct Config {
    values: HashMap<Parameter, String>,
    pub password: Option<String>,
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum Parameter {
    Port,
    StoreAddr,
    MaxIdle,
    IdleTimeout,
    Mode,
}

impl Parameter {
    pub fn deserialize(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "port" => Ok(Parameter::Port),
            "store-addr" => Ok(Parameter::StoreAddr),
            "max-idle" => Ok(Parameter::MaxIdle),
            "idle-timeout" => Ok(Parameter::IdleTimeout),
            "mode" => Ok(Parameter::Mode),
            _ => Err(anyhow::format_err!("unknown parameter {:?}", s)),
        }
    }

    pub fn serialize(&self) -> &'static str {
        match self {
            Parameter::Port => "port",
            Parameter::StoreAddr => "store-addr",
            Parameter::MaxIdle => "max-idle",
            Parameter::IdleTimeout => "idle-timeout",
            Parameter::Mode => "mode",
        }
    }
}

impl Config {
    /// Load config from `--name value` command line arguments, skipping the
    /// program name.
    pub fn from_args<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut current_key = None;
        for arg in args.into_iter().skip(1) {
            if let Some(current_key) = current_key.take() {
                config.values.insert(current_key, arg);
            } else if let Some(name) = arg.strip_prefix("--") {
                current_key = Some(Parameter::deserialize(name)?);
            } else {
                anyhow::bail!("invalid argument {:?}", arg)
            }
        }
        if let Some(key) = current_key {
            anyhow::bail!("missing value for --{}", key.serialize())
        }
        Ok(config)
    }

    /// Read the store credential from the environment. Unset and empty both mean
    /// no credential.
    pub fn with_password_from_env(mut self) -> Self {
        self.password = std::env::var(PASSWORD_VAR).ok().filter(|p| !p.is_empty());
        self
    }

    pub fn port(&self) -> anyhow::Result<u16> {
        self.parse_or(Parameter::Port, DEFAULT_PORT)
    }

    pub fn store_addr(&self) -> &str {
        self.values
            .get(&Parameter::StoreAddr)
            .map(String::as_str)
            .unwrap_or(DEFAULT_STORE_ADDR)
    }

    pub fn max_idle(&self) -> anyhow::Result<usize> {
        self.parse_or(Parameter::MaxIdle, DEFAULT_MAX_IDLE)
    }

    pub fn idle_timeout(&self) -> anyhow::Result<Duration> {
        self.parse_or(Parameter::IdleTimeout, DEFAULT_IDLE_TIMEOUT.as_secs())
            .map(Duration::from_secs)
    }

    pub fn mode(&self) -> anyhow::Result<Mode> {
        self.parse_or(Parameter::Mode, Mode::default())
    }

    fn parse_or<T>(&self, parameter: Parameter, default: T) -> anyhow::Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.values.get(&parameter) {
            Some(value) => value.parse::<T>().map_err(|e| {
                anyhow::format_err!("invalid --{} {:?}: {}", parameter.serialize(), value, e)
            }),
            None => Ok(default),
        }
    }
}
