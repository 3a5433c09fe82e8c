use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use crate::command::{Command, Reply};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("store connection i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store closed the connection")]
    Closed,
    #[error("malformed reply from store: {0}")]
    Protocol(anyhow::Error),
    #[error("store replied with error: {0}")]
    Server(String),
    #[error("unexpected reply to {command}: {reply:?}")]
    UnexpectedReply { command: &'static str, reply: Reply },
}

impl StoreError {
    /// Whether the connection that produced this error can no longer be trusted
    /// to be in sync with the store.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            StoreError::Server(_) | StoreError::UnexpectedReply { .. }
        )
    }
}

/// A single connection to the store, speaking one request and one reply at a time.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    input_buf: BytesMut,
    output_buf: BytesMut,
}

impl Connection {
    pub async fn connect(addr: &str) -> Result<Self, StoreError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| StoreError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        tracing::debug!(addr, "connected to store");
        Ok(Connection {
            stream,
            input_buf: BytesMut::with_capacity(512),
            output_buf: BytesMut::with_capacity(512),
        })
    }

    /// Send `command` and wait for its reply. Error replies from the store come
    /// back as [`StoreError::Server`].
    pub async fn send(&mut self, command: &Command) -> Result<Reply, StoreError> {
        self.output_buf.clear();
        command.serialize(&mut self.output_buf);
        self.stream.write_all(&self.output_buf).await?;
        tracing::trace!(command = command.name(), "sent command");

        loop {
            if let Some((reply, consumed)) =
                Reply::deserialize(&self.input_buf).map_err(StoreError::Protocol)?
            {
                self.input_buf.advance(consumed);
                return match reply {
                    Reply::Error(message) => Err(StoreError::Server(message)),
                    reply => Ok(reply),
                };
            }
            if self.stream.read_buf(&mut self.input_buf).await? == 0 {
                return Err(StoreError::Closed);
            }
        }
    }
}
