//! Memcached client
//!
//! Speaks the ASCII protocol over a small pool of TCP connections. Each pool
//! slot holds at most one connection, established on first use and dropped
//! after any I/O or protocol failure so the next request reconnects.

use crate::client::{CacheClient, CacheError, CacheResult};
use crate::protocol::{self, ParseError, Reply};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Memcached client configuration
#[derive(Clone, Debug)]
pub struct MemcacheConfig {
    /// `host:port` of the memcached server
    pub address: String,
    /// Number of pooled connections
    pub pool_size: usize,
    /// Per-request deadline, covering connect, write and read
    pub timeout: Duration,
}

impl MemcacheConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for MemcacheConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:11211".to_string(),
            pool_size: 4,
            timeout: Duration::from_millis(500),
        }
    }
}

/// One established connection and its unread input
struct Connection {
    stream: TcpStream,
    buf: BytesMut,
}

impl Connection {
    async fn connect(address: &str) -> CacheResult<Self> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        debug!("Connected to memcached at {}", address);
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(4096),
        })
    }

    /// Send one request and read exactly one reply
    async fn round_trip(&mut self, request: &[u8]) -> CacheResult<Reply> {
        self.stream.write_all(request).await?;
        loop {
            match protocol::parse_reply(&self.buf) {
                Ok((reply, consumed)) => {
                    self.buf.advance(consumed);
                    return Ok(reply);
                }
                Err(ParseError::Incomplete) => {}
                Err(ParseError::Invalid(msg)) => return Err(CacheError::Protocol(msg)),
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(CacheError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "memcached closed the connection",
                )));
            }
        }
    }
}

/// Memcached-backed [`CacheClient`]
pub struct MemcacheClient {
    config: MemcacheConfig,
    slots: Vec<Mutex<Option<Connection>>>,
    next: AtomicUsize,
}

impl MemcacheClient {
    /// Create a client. No connection is opened until the first request.
    pub fn new(config: MemcacheConfig) -> Self {
        let slots = (0..config.pool_size.max(1)).map(|_| Mutex::new(None)).collect();
        Self {
            config,
            slots,
            next: AtomicUsize::new(0),
        }
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    fn check_key(key: &str) -> CacheResult<()> {
        if protocol::is_valid_key(key) {
            Ok(())
        } else {
            Err(CacheError::InvalidKey(key.to_string()))
        }
    }

    async fn execute(&self, request: &[u8]) -> CacheResult<Reply> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let mut slot = self.slots[idx].lock().await;

        let result = tokio::time::timeout(self.config.timeout, async {
            if slot.is_none() {
                *slot = Some(Connection::connect(&self.config.address).await?);
            }
            match slot.as_mut() {
                Some(conn) => conn.round_trip(request).await,
                None => Err(CacheError::Unavailable(self.config.address.clone())),
            }
        })
        .await;

        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                warn!("memcached request to {} failed: {}", self.config.address, e);
                *slot = None;
                Err(e)
            }
            Err(_) => {
                warn!("memcached request to {} timed out", self.config.address);
                *slot = None;
                Err(CacheError::Timeout)
            }
        }
    }
}

fn unexpected(command: &str, reply: &Reply) -> CacheError {
    CacheError::Protocol(format!("unexpected reply to {command}: {reply:?}"))
}

#[async_trait]
impl CacheClient for MemcacheClient {
    fn name(&self) -> &str {
        "memcached"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        Self::check_key(key)?;
        match self.execute(&protocol::encode_get(key)).await? {
            Reply::Value(value) => Ok(value),
            Reply::Error(msg) => Err(CacheError::Server(msg)),
            other => Err(unexpected("get", &other)),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        Self::check_key(key)?;
        match self.execute(&protocol::encode_set(key, value, 0, 0)).await? {
            Reply::Stored => Ok(()),
            Reply::NotStored => Err(CacheError::NotStored(key.to_string())),
            Reply::Error(msg) => Err(CacheError::Server(msg)),
            other => Err(unexpected("set", &other)),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        Self::check_key(key)?;
        match self.execute(&protocol::encode_delete(key)).await? {
            Reply::Deleted | Reply::NotFound => Ok(()),
            Reply::Error(msg) => Err(CacheError::Server(msg)),
            other => Err(unexpected("delete", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    /// Minimal memcached speaking get/set/delete, shared across connections
    async fn spawn_fake_memcached() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let store: Arc<parking_lot::Mutex<HashMap<String, Vec<u8>>>> = Arc::default();

        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let store = store.clone();
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut reader = BufReader::new(read);
                    let mut line = String::new();
                    loop {
                        line.clear();
                        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                            return;
                        }
                        let parts: Vec<&str> = line.trim_end().split(' ').collect();
                        let response = match parts.as_slice() {
                            ["get", key] => {
                                let found = store.lock().get(*key).cloned();
                                match found {
                                    Some(v) => {
                                        let mut out =
                                            format!("VALUE {key} 0 {}\r\n", v.len()).into_bytes();
                                        out.extend_from_slice(&v);
                                        out.extend_from_slice(b"\r\nEND\r\n");
                                        out
                                    }
                                    None => b"END\r\n".to_vec(),
                                }
                            }
                            ["set", key, _, _, len] => {
                                let len: usize = len.parse().unwrap();
                                let mut data = vec![0u8; len + 2];
                                reader.read_exact(&mut data).await.unwrap();
                                data.truncate(len);
                                store.lock().insert((*key).to_string(), data);
                                b"STORED\r\n".to_vec()
                            }
                            ["delete", key] => {
                                let removed = store.lock().remove(*key).is_some();
                                if removed {
                                    b"DELETED\r\n".to_vec()
                                } else {
                                    b"NOT_FOUND\r\n".to_vec()
                                }
                            }
                            _ => b"ERROR\r\n".to_vec(),
                        };
                        if write.write_all(&response).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let addr = spawn_fake_memcached().await;
        let client = MemcacheClient::new(MemcacheConfig::new(addr).with_pool_size(2));

        assert_eq!(client.get("Restaurant-A").await.unwrap(), None);

        client.set("Restaurant-A", b"{\"rating\":4.5}").await.unwrap();
        // Round-robin puts the second read on the other connection
        for _ in 0..3 {
            assert_eq!(
                client.get("Restaurant-A").await.unwrap(),
                Some(Bytes::from_static(b"{\"rating\":4.5}"))
            );
        }

        client.delete("Restaurant-A").await.unwrap();
        assert_eq!(client.get("Restaurant-A").await.unwrap(), None);

        // Deleting a missing key succeeds
        client.delete("Restaurant-A").await.unwrap();
    }

    #[tokio::test]
    async fn test_value_containing_crlf() {
        let addr = spawn_fake_memcached().await;
        let client = MemcacheClient::new(MemcacheConfig::new(addr));

        client.set("k", b"line1\r\nline2").await.unwrap();
        assert_eq!(
            client.get("k").await.unwrap(),
            Some(Bytes::from_static(b"line1\r\nline2"))
        );
    }

    #[tokio::test]
    async fn test_invalid_key_rejected_locally() {
        // Nothing listens here; the key check must fail before any connect
        let client = MemcacheClient::new(MemcacheConfig::new("127.0.0.1:1"));
        let err = client.get("has space").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = MemcacheClient::new(MemcacheConfig::new(addr));
        let err = client.get("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Io(_) | CacheError::Timeout));
    }

    #[tokio::test]
    async fn test_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        // Accept and hold connections without ever replying
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = MemcacheClient::new(
            MemcacheConfig::new(addr).with_timeout(Duration::from_millis(50)),
        );
        let err = client.get("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Timeout));
    }

    #[tokio::test]
    async fn test_server_error_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"SERVER_ERROR out of memory\r\n").await.unwrap();
        });

        let client = MemcacheClient::new(MemcacheConfig::new(addr));
        let err = client.set("k", b"v").await.unwrap_err();
        assert!(matches!(err, CacheError::Server(ref m) if m.contains("out of memory")));
    }

    #[test]
    fn test_config_defaults() {
        let config = MemcacheConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.pool_size, 4);

        let client = MemcacheClient::new(MemcacheConfig::new("cache:11211").with_pool_size(0));
        assert_eq!(client.slots.len(), 1);
        assert_eq!(client.address(), "cache:11211");
    }
}
