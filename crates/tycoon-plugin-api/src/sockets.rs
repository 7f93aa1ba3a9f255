//! Plugin-owned TCP sockets.
//!
//! Scripts never see a raw socket. They hold a handle into the
//! [`SocketRegistry`]; the engine services every socket once per update with
//! non-blocking reads and writes and hands the resulting events back so the
//! Lua handlers can be called with no lock held.
//!
//! `connect` returns at once. The connection is made on a short-lived thread
//! and picked up by a later [`SocketRegistry::service`] pass; writes queued in
//! the meantime are flushed then. Connections are limited to the local machine.

use std::collections::HashMap;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{PluginError, PluginResult};
use crate::handle::{Handle, OwnedRegistry};
use crate::types::{LuaFunctionRef, Plugin, PluginId};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const READ_CHUNK: usize = 4096;
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// Events a script can listen for with `socket:on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketEventKind {
    Data,
    Close,
    Error,
}

impl SocketEventKind {
    pub fn parse(name: &str) -> PluginResult<Self> {
        match name {
            "data" => Ok(Self::Data),
            "close" => Ok(Self::Close),
            "error" => Ok(Self::Error),
            other => Err(PluginError::Socket(format!(
                "Unknown socket event '{}'. Expected 'data', 'close', or 'error'",
                other
            ))),
        }
    }
}

enum Connection {
    Idle,
    Connecting(Receiver<io::Result<TcpStream>>),
    Open(TcpStream),
}

pub struct ScriptSocket {
    pub owner: Arc<Plugin>,
    connection: Connection,
    outbox: Vec<u8>,
    handlers: HashMap<SocketEventKind, LuaFunctionRef>,
}

impl ScriptSocket {
    pub fn is_connected(&self) -> bool {
        matches!(self.connection, Connection::Open(_))
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self.connection, Connection::Connecting(_))
    }

    /// Handler refs the caller must release from the interpreter.
    pub fn into_handlers(self) -> Vec<LuaFunctionRef> {
        self.handlers.into_values().collect()
    }

    /// Move a finished connect attempt into place. Returns the failure, if any.
    fn poll_connect(&mut self) -> Option<String> {
        let Connection::Connecting(rx) = &self.connection else {
            return None;
        };
        let outcome = match rx.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                Err(io::Error::new(ErrorKind::Other, "connect attempt abandoned"))
            }
        };
        match outcome.and_then(|stream| {
            stream.set_nonblocking(true)?;
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }) {
            Ok(stream) => {
                self.connection = Connection::Open(stream);
                None
            }
            Err(e) => {
                self.connection = Connection::Idle;
                self.outbox.clear();
                Some(e.to_string())
            }
        }
    }
}

/// Something that happened on a socket during [`SocketRegistry::service`].
///
/// Data payloads are the raw bytes read; they need not be valid UTF-8.
#[derive(Debug, Clone)]
pub struct SocketEvent {
    pub handle: Handle,
    pub owner: Arc<Plugin>,
    pub kind: SocketEventKind,
    pub callback: LuaFunctionRef,
    pub payload: Option<Vec<u8>>,
}

pub struct SocketRegistry {
    sockets: Mutex<OwnedRegistry<ScriptSocket>>,
    max_sockets: usize,
}

impl SocketRegistry {
    pub fn new(max_sockets: usize) -> Self {
        Self {
            sockets: Mutex::new(OwnedRegistry::new()),
            max_sockets,
        }
    }

    pub fn create(&self, owner: Arc<Plugin>) -> PluginResult<Handle> {
        let mut sockets = self.sockets.lock();
        if sockets.len() >= self.max_sockets {
            return Err(PluginError::TooManySockets(self.max_sockets));
        }
        let owner_id = owner.id();
        let handle = sockets.insert(
            owner_id,
            ScriptSocket {
                owner,
                connection: Connection::Idle,
                outbox: Vec::new(),
                handlers: HashMap::new(),
            },
        );
        tracing::debug!("Created socket {} for plugin {}", handle.raw(), owner_id);
        Ok(handle)
    }

    /// Start connecting. The outcome arrives through [`service`](Self::service):
    /// the socket becomes connected, or an error and a close event fire.
    pub fn connect(&self, handle: Handle, host: &str, port: u16) -> PluginResult<()> {
        if !LOCAL_HOSTS.contains(&host) {
            return Err(PluginError::Socket(format!(
                "Connections to '{}' are not allowed",
                host
            )));
        }
        let addr = resolve(host, port)?;

        let mut sockets = self.sockets.lock();
        let socket = sockets.get_mut(handle).ok_or(PluginError::InvalidHandle)?;
        if !matches!(socket.connection, Connection::Idle) {
            return Err(PluginError::Socket("socket is already connected".into()));
        }

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("socket-connect-{}", handle.raw()))
            .spawn(move || {
                let _ = tx.send(TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT));
            })
            .map_err(|e| PluginError::Socket(format!("connect {}: {}", addr, e)))?;
        socket.connection = Connection::Connecting(rx);
        tracing::debug!("Socket {} connecting to {}", handle.raw(), addr);
        Ok(())
    }

    /// Queue bytes for the next service pass.
    pub fn write(&self, handle: Handle, data: &[u8]) -> PluginResult<()> {
        let mut sockets = self.sockets.lock();
        let socket = sockets.get_mut(handle).ok_or(PluginError::InvalidHandle)?;
        if matches!(socket.connection, Connection::Idle) {
            return Err(PluginError::Socket("socket is not connected".into()));
        }
        socket.outbox.extend_from_slice(data);
        Ok(())
    }

    /// Install a handler, returning the one it replaces.
    pub fn on(
        &self,
        handle: Handle,
        kind: SocketEventKind,
        callback: LuaFunctionRef,
    ) -> PluginResult<Option<LuaFunctionRef>> {
        let mut sockets = self.sockets.lock();
        let socket = sockets.get_mut(handle).ok_or(PluginError::InvalidHandle)?;
        Ok(socket.handlers.insert(kind, callback))
    }

    pub fn destroy(&self, handle: Handle) -> Option<ScriptSocket> {
        let socket = self.sockets.lock().remove(handle)?;
        tracing::debug!("Destroyed socket {}", handle.raw());
        Some(socket)
    }

    pub fn remove_plugin(&self, owner: PluginId) -> Vec<ScriptSocket> {
        self.sockets.lock().remove_owner(owner)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.sockets.lock().contains(handle)
    }

    pub fn is_connected(&self, handle: Handle) -> bool {
        self.sockets
            .lock()
            .get(handle)
            .is_some_and(ScriptSocket::is_connected)
    }

    pub fn len(&self) -> usize {
        self.sockets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.lock().is_empty()
    }

    /// Finish pending connects, flush queued writes and read whatever has
    /// arrived, without blocking.
    pub fn service(&self) -> Vec<SocketEvent> {
        let mut events = Vec::new();
        let mut sockets = self.sockets.lock();
        let handles: Vec<Handle> = sockets.iter().map(|(h, _, _)| h).collect();

        for handle in handles {
            let Some(socket) = sockets.get_mut(handle) else {
                continue;
            };

            let mut happened: Vec<(SocketEventKind, Option<Vec<u8>>)> = Vec::new();
            if let Some(message) = socket.poll_connect() {
                tracing::debug!("Socket {} failed to connect: {}", handle.raw(), message);
                happened.push((SocketEventKind::Error, Some(message.into_bytes())));
                happened.push((SocketEventKind::Close, None));
            }

            if let Connection::Open(stream) = &mut socket.connection {
                let mut closed = false;
                if let Err(e) = flush(stream, &mut socket.outbox) {
                    happened.push((SocketEventKind::Error, Some(e.to_string().into_bytes())));
                    closed = true;
                }

                let mut received = Vec::new();
                let mut buf = [0u8; READ_CHUNK];
                while !closed {
                    match stream.read(&mut buf) {
                        Ok(0) => closed = true,
                        Ok(n) => received.extend_from_slice(&buf[..n]),
                        Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            happened.push((SocketEventKind::Error, Some(e.to_string().into_bytes())));
                            closed = true;
                        }
                    }
                }
                if !received.is_empty() {
                    happened.insert(0, (SocketEventKind::Data, Some(received)));
                }
                if closed {
                    socket.connection = Connection::Idle;
                    socket.outbox.clear();
                    happened.push((SocketEventKind::Close, None));
                }
            }

            for (kind, payload) in happened {
                if let Some(callback) = socket.handlers.get(&kind) {
                    events.push(SocketEvent {
                        handle,
                        owner: Arc::clone(&socket.owner),
                        kind,
                        callback: callback.clone(),
                        payload,
                    });
                }
            }
        }
        events
    }
}

fn resolve(host: &str, port: u16) -> PluginResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| PluginError::Socket(format!("resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| PluginError::Socket(format!("no address for {}", host)))
}

fn flush(stream: &mut TcpStream, outbox: &mut Vec<u8>) -> io::Result<()> {
    while !outbox.is_empty() {
        match stream.write(outbox) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => {
                outbox.drain(..n);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn plugin() -> Arc<Plugin> {
        Arc::new(Plugin::new(None, String::new()))
    }

    #[test]
    fn test_socket_limit() {
        let sockets = SocketRegistry::new(2);
        let owner = plugin();
        sockets.create(Arc::clone(&owner)).unwrap();
        sockets.create(Arc::clone(&owner)).unwrap();
        assert!(matches!(
            sockets.create(owner),
            Err(PluginError::TooManySockets(2))
        ));
    }

    #[test]
    fn test_remote_hosts_refused() {
        let sockets = SocketRegistry::new(4);
        let handle = sockets.create(plugin()).unwrap();
        assert!(matches!(
            sockets.connect(handle, "example.com", 80),
            Err(PluginError::Socket(_))
        ));
    }

    #[test]
    fn test_write_before_connect_fails() {
        let sockets = SocketRegistry::new(4);
        let handle = sockets.create(plugin()).unwrap();
        assert!(sockets.write(handle, b"hi").is_err());
        assert!(matches!(
            sockets.write(Handle::from_raw(99).unwrap(), b"hi"),
            Err(PluginError::InvalidHandle)
        ));
    }

    fn wait_connected(sockets: &SocketRegistry, handle: Handle) {
        for _ in 0..200 {
            sockets.service();
            if sockets.is_connected(handle) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("socket {} never connected", handle.raw());
    }

    #[test]
    fn test_connect_returns_before_the_connection_is_made() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let sockets = SocketRegistry::new(4);
        let handle = sockets.create(plugin()).unwrap();
        sockets.connect(handle, "127.0.0.1", port).unwrap();
        assert!(!sockets.is_connected(handle));
        sockets.write(handle, b"queued").unwrap();
        assert!(matches!(
            sockets.connect(handle, "127.0.0.1", port),
            Err(PluginError::Socket(_))
        ));

        let (mut peer, _) = listener.accept().unwrap();
        wait_connected(&sockets, handle);
        let mut buf = [0u8; 6];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"queued");
    }

    #[test]
    fn test_failed_connect_reports_error_and_close() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let sockets = SocketRegistry::new(4);
        let handle = sockets.create(plugin()).unwrap();
        sockets
            .on(handle, SocketEventKind::Error, LuaFunctionRef::new("on-error".into()))
            .unwrap();
        sockets
            .on(handle, SocketEventKind::Close, LuaFunctionRef::new("on-close".into()))
            .unwrap();
        sockets.connect(handle, "127.0.0.1", port).unwrap();

        let mut kinds = Vec::new();
        for _ in 0..400 {
            kinds.extend(sockets.service().into_iter().map(|e| e.kind));
            if !kinds.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(kinds, vec![SocketEventKind::Error, SocketEventKind::Close]);
        assert!(!sockets.is_connected(handle));
        assert!(sockets.write(handle, b"late").is_err());
    }

    #[test]
    fn test_split_multibyte_data_is_delivered_intact() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let sockets = SocketRegistry::new(4);
        let handle = sockets.create(plugin()).unwrap();
        sockets
            .on(handle, SocketEventKind::Data, LuaFunctionRef::new("on-data".into()))
            .unwrap();
        sockets.connect(handle, "127.0.0.1", port).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        wait_connected(&sockets, handle);

        let received = |sockets: &SocketRegistry| -> Vec<u8> {
            sockets
                .service()
                .into_iter()
                .flat_map(|event| event.payload.unwrap_or_default())
                .collect()
        };
        peer.write_all(&[b'a', 0xC3]).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let mut data = received(&sockets);
        peer.write_all(&[0xA9]).unwrap();
        for _ in 0..200 {
            data.extend(received(&sockets));
            std::thread::sleep(Duration::from_millis(5));
            if data.len() == 3 {
                break;
            }
        }
        assert_eq!(String::from_utf8(data).unwrap(), "a\u{e9}");
    }

    #[test]
    fn test_service_delivers_data_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let sockets = SocketRegistry::new(4);
        let owner = plugin();
        let handle = sockets.create(Arc::clone(&owner)).unwrap();
        sockets
            .on(handle, SocketEventKind::Data, LuaFunctionRef::new("on-data".into()))
            .unwrap();
        sockets
            .on(handle, SocketEventKind::Close, LuaFunctionRef::new("on-close".into()))
            .unwrap();
        sockets.connect(handle, "127.0.0.1", port).unwrap();
        sockets.write(handle, b"ping").unwrap();

        let (mut peer, _) = listener.accept().unwrap();
        wait_connected(&sockets, handle);

        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        peer.write_all(b"pong").unwrap();
        drop(peer);

        let mut data = Vec::new();
        let mut saw_close = false;
        for _ in 0..200 {
            for event in sockets.service() {
                match event.kind {
                    SocketEventKind::Data => data.extend(event.payload.unwrap_or_default()),
                    SocketEventKind::Close => saw_close = true,
                    SocketEventKind::Error => {}
                }
            }
            if saw_close {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(data, b"pong");
        assert!(saw_close);
    }

    #[test]
    fn test_remove_plugin_returns_handlers() {
        let sockets = SocketRegistry::new(4);
        let owner = plugin();
        let handle = sockets.create(Arc::clone(&owner)).unwrap();
        sockets
            .on(handle, SocketEventKind::Error, LuaFunctionRef::new("e".into()))
            .unwrap();

        let removed = sockets.remove_plugin(owner.id());
        assert_eq!(removed.len(), 1);
        assert!(!sockets.contains(handle));
        let handlers = removed.into_iter().next().unwrap().into_handlers();
        assert_eq!(handlers, vec![LuaFunctionRef::new("e".into())]);
    }
}
