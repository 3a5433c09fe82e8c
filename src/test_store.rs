//! An in-process key-value store speaking just enough RESP for the tests.

use bytes::{Buf, BytesMut};
use std::{
    collections::HashMap,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpSocket, TcpStream},
};

use crate::{
    command::{Command, Reply, SetCondition},
    resp_value::RespValue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Reply with an error instead of running the command.
    Error,
    /// Close the connection without replying.
    HangUp,
}

#[derive(Default)]
struct Store {
    data: HashMap<String, StoreValue>,
    password: Option<String>,
    faults: HashMap<&'static str, Fault>,
}

#[derive(Debug)]
struct StoreValue {
    data: String,
    updated: Instant,
    expiry: Option<Duration>,
}

impl StoreValue {
    fn is_expired(&self) -> bool {
        matches!(self.expiry, Some(d) if Instant::now() >= self.updated + d)
    }
}

impl Store {
    fn live(&mut self, key: &str) -> Option<&mut StoreValue> {
        if self.data.get(key).is_some_and(StoreValue::is_expired) {
            self.data.remove(key);
        }
        self.data.get_mut(key)
    }

    fn handle_request(&mut self, request: &Command, authenticated: &mut bool) -> Reply {
        if let Command::Auth { password } = request {
            return match &self.password {
                None => Reply::Error(
                    "ERR AUTH <password> called without any password configured".into(),
                ),
                Some(expected) if expected == password => {
                    *authenticated = true;
                    Reply::Status("OK".into())
                }
                Some(_) => Reply::Error(
                    "WRONGPASS invalid username-password pair or user is disabled.".into(),
                ),
            };
        }
        if self.password.is_some() && !*authenticated {
            return Reply::Error("NOAUTH Authentication required.".into());
        }

        match request {
            Command::Ping => Reply::Status("PONG".into()),
            Command::Auth { .. } => unreachable!(),
            Command::Exists { key } => Reply::Integer(self.live(key).is_some() as i64),
            Command::Set {
                key,
                value,
                condition,
                expiry,
            } => {
                if *condition == Some(SetCondition::IfAbsent) && self.live(key).is_some() {
                    return Reply::Bulk(None);
                }
                self.data.insert(
                    key.to_string(),
                    StoreValue {
                        data: value.to_string(),
                        updated: Instant::now(),
                        expiry: *expiry,
                    },
                );
                Reply::Status("OK".into())
            }
            Command::Expire { key, seconds } => match self.live(key) {
                Some(value) => {
                    value.updated = Instant::now();
                    value.expiry = Some(Duration::from_secs(*seconds));
                    Reply::Integer(1)
                }
                None => Reply::Integer(0),
            },
        }
    }
}

/// Handle to a running fake store. The listener task lives as long as the runtime.
#[derive(Clone)]
pub struct FakeStore {
    addr: SocketAddr,
    store: Arc<Mutex<Store>>,
    connections: Arc<AtomicUsize>,
    auths: Arc<AtomicUsize>,
}

impl FakeStore {
    pub async fn start() -> Self {
        Self::start_with(None).await
    }

    pub async fn with_password(password: &str) -> Self {
        Self::start_with(Some(password.to_string())).await
    }

    async fn start_with(password: Option<String>) -> Self {
        let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
            .await
            .unwrap();
        let store = FakeStore {
            addr: listener.local_addr().unwrap(),
            store: Arc::new(Mutex::new(Store {
                password,
                ..Store::default()
            })),
            connections: Arc::new(AtomicUsize::new(0)),
            auths: Arc::new(AtomicUsize::new(0)),
        };
        let handle = store.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                handle.connections.fetch_add(1, Ordering::SeqCst);
                let handle = handle.clone();
                tokio::spawn(async move { handle.handle_connection(stream).await });
            }
        });
        store
    }

    async fn handle_connection(&self, mut stream: TcpStream) {
        let mut input_buf = BytesMut::with_capacity(512);
        let mut output_buf = BytesMut::with_capacity(512);
        let mut authenticated = false;
        loop {
            match stream.read_buf(&mut input_buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            loop {
                let (request, consumed) = match RespValue::deserialize(&input_buf).unwrap() {
                    Some((value, rest)) => (
                        Command::deserialize(&value).unwrap(),
                        input_buf.len() - rest.len(),
                    ),
                    None => break,
                };
                input_buf.advance(consumed);
                if matches!(request, Command::Auth { .. }) {
                    self.auths.fetch_add(1, Ordering::SeqCst);
                }

                let reply = {
                    let mut store = self.store.lock().unwrap();
                    match store.faults.get(request.name()).copied() {
                        Some(Fault::HangUp) => return,
                        Some(Fault::Error) => Reply::Error("ERR injected failure".into()),
                        None => store.handle_request(&request, &mut authenticated),
                    }
                };
                output_buf.clear();
                reply.serialize(&mut output_buf);
                if stream.write_all(&output_buf).await.is_err() {
                    return;
                }
            }
        }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Number of `AUTH` commands received so far, across all connections.
    pub fn auths(&self) -> usize {
        self.auths.load(Ordering::SeqCst)
    }

    pub fn inject(&self, command: &'static str, fault: Fault) {
        self.store.lock().unwrap().faults.insert(command, fault);
    }

    pub fn insert(&self, key: &str, value: &str, expiry: Option<Duration>) {
        self.store.lock().unwrap().data.insert(
            key.to_string(),
            StoreValue {
                data: value.to_string(),
                updated: Instant::now(),
                expiry,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.store.lock().unwrap().live(key).map(|v| v.data.clone())
    }

    /// Remaining time to live: `None` if the key is missing, `Some(None)` if it
    /// never expires.
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        self.store
            .lock()
            .unwrap()
            .live(key)
            .map(|v| v.expiry.map(|d| d.saturating_sub(v.updated.elapsed())))
    }

    /// Make `key` expire as if its time to live had run out.
    pub fn expire_now(&self, key: &str) {
        if let Some(value) = self.store.lock().unwrap().data.get_mut(key) {
            value.expiry = Some(Duration::ZERO);
        }
    }
}

/// A local port that is bound but never listened on, so connecting to it is
/// refused. The port stays reserved until this is dropped.
pub struct ClosedPort {
    socket: TcpSocket,
}

impl ClosedPort {
    pub fn new() -> Self {
        let socket = TcpSocket::new_v4().unwrap();
        socket
            .bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0).into())
            .unwrap();
        ClosedPort { socket }
    }

    pub fn addr(&self) -> String {
        self.socket.local_addr().unwrap().to_string()
    }
}
