use bytes::BytesMut;
use std::time::Duration;

use crate::resp_value::RespValue;

/// A request sent to the key-value store.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Auth {
        password: String,
    },
    Exists {
        key: String,
    },
    Set {
        key: String,
        value: String,
        condition: Option<SetCondition>,
        expiry: Option<Duration>,
    },
    Expire {
        key: String,
        seconds: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// `NX`: only set the key if it does not already exist.
    IfAbsent,
}

/// A reply read back from the key-value store.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Status(String),
    Integer(i64),
    Bulk(Option<String>),
    Array(Vec<Reply>),
    Boolean(bool),
    Error(String),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Auth { .. } => "AUTH",
            Command::Exists { .. } => "EXISTS",
            Command::Set { .. } => "SET",
            Command::Expire { .. } => "EXPIRE",
        }
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        let mut values = vec![RespValue::BulkString(self.name())];
        match self {
            Command::Ping => {}
            Command::Auth { password } => values.push(RespValue::BulkString(password)),
            Command::Exists { key } => values.push(RespValue::BulkString(key)),
            Command::Set {
                key,
                value,
                condition,
                expiry,
            } => {
                values.push(RespValue::BulkString(key));
                values.push(RespValue::BulkString(value));
                if let Some(SetCondition::IfAbsent) = condition {
                    values.push(RespValue::BulkString("NX"));
                }
                if let Some(expiry) = expiry {
                    values.push(RespValue::BulkString("EX"));
                    values.push(RespValue::OwnedBulkString(expiry.as_secs().to_string()));
                }
            }
            Command::Expire { key, seconds } => {
                values.push(RespValue::BulkString(key));
                values.push(RespValue::OwnedBulkString(seconds.to_string()));
            }
        }
        RespValue::Array(values).serialize(buf);
    }

    /// Parse a command the way a store would receive it.
    #[cfg(test)]
    pub fn deserialize(value: &RespValue) -> anyhow::Result<Self> {
        let RespValue::Array(elements) = value else {
            return Err(anyhow::format_err!("requests must be arrays"));
        };
        let mut args = Vec::with_capacity(elements.len());
        for element in elements.iter() {
            match element {
                RespValue::BulkString(s) => args.push(*s),
                _ => return Err(anyhow::format_err!("arguments must be bulk strings")),
            }
        }
        let Some((name, args)) = args.split_first() else {
            return Err(anyhow::format_err!("empty request"));
        };
        let arg = |i: usize| -> anyhow::Result<String> {
            args.get(i).map(|s| s.to_string()).ok_or_else(|| {
                anyhow::format_err!("malformed {} command", name.to_uppercase())
            })
        };

        match name.to_ascii_uppercase().as_str() {
            "PING" => Ok(Command::Ping),
            "AUTH" => Ok(Command::Auth { password: arg(0)? }),
            "EXISTS" => Ok(Command::Exists { key: arg(0)? }),
            "EXPIRE" => Ok(Command::Expire {
                key: arg(0)?,
                seconds: arg(1)?.parse::<u64>()?,
            }),
            "SET" => {
                let key = arg(0)?;
                let value = arg(1)?;
                let mut condition = None;
                let mut expiry = None;
                let mut i = 2;
                while i < args.len() {
                    match args[i].to_ascii_uppercase().as_str() {
                        "NX" => condition = Some(SetCondition::IfAbsent),
                        "EX" => {
                            expiry = Some(Duration::from_secs(arg(i + 1)?.parse::<u64>()?));
                            i += 1;
                        }
                        "PX" => {
                            expiry = Some(Duration::from_millis(arg(i + 1)?.parse::<u64>()?));
                            i += 1;
                        }
                        option => {
                            return Err(anyhow::format_err!("unsupported SET option {:?}", option))
                        }
                    }
                    i += 1;
                }
                Ok(Command::Set {
                    key,
                    value,
                    condition,
                    expiry,
                })
            }
            command => Err(anyhow::format_err!(
                "unknown command {:?}",
                command.to_uppercase()
            )),
        }
    }
}

impl Reply {
    /// Decode one reply from the front of `data`, returning it with the number of
    /// bytes consumed, or `None` if the reply is not complete yet.
    pub fn deserialize(data: &[u8]) -> anyhow::Result<Option<(Self, usize)>> {
        match RespValue::deserialize(data)? {
            Some((value, rest)) => Ok(Some((Reply::from(value), data.len() - rest.len()))),
            None => Ok(None),
        }
    }

    #[cfg(test)]
    pub fn serialize(&self, buf: &mut BytesMut) {
        self.to_resp().serialize(buf);
    }

    #[cfg(test)]
    fn to_resp(&self) -> RespValue<'_> {
        match self {
            Reply::Status(s) => RespValue::SimpleString(s),
            Reply::Integer(n) => RespValue::Integer(*n),
            Reply::Bulk(Some(s)) => RespValue::BulkString(s),
            Reply::Bulk(None) => RespValue::NullBulkString,
            Reply::Array(elements) => RespValue::Array(elements.iter().map(Reply::to_resp).collect()),
            Reply::Boolean(b) => RespValue::Boolean(*b),
            Reply::Error(s) => RespValue::SimpleError(s),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Status(s) if s.eq_ignore_ascii_case("OK"))
    }
}

impl From<RespValue<'_>> for Reply {
    fn from(value: RespValue<'_>) -> Self {
        match value {
            RespValue::SimpleString(s) => Reply::Status(s.to_string()),
            RespValue::SimpleError(s) => Reply::Error(s.to_string()),
            RespValue::Integer(n) => Reply::Integer(n),
            RespValue::OwnedBulkString(s) => Reply::Bulk(Some(s)),
            RespValue::BulkString(s) => Reply::Bulk(Some(s.to_string())),
            RespValue::NullBulkString | RespValue::NullArray | RespValue::Null => Reply::Bulk(None),
            RespValue::Array(elements) => {
                Reply::Array(elements.into_iter().map(Reply::from).collect())
            }
            RespValue::Boolean(b) => Reply::Boolean(b),
        }
    }
}
