//! TCP endpoints: a capacity-bounded `Server` that accepts peers, and a
//! `Client` that dials one.
//!
//! Generalizes `termihub-agent::io::tcp::run_tcp_listener`'s accept loop,
//! which serves exactly one connection at a time, into one that tracks a
//! set of concurrent peers and turns away connections past `max_clients`
//! instead of serializing them.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::channel::Channel;
use crate::codec;
use crate::content::{self, Category};
use crate::errors::{Result, XenError};

/// A shared, lockable handle to one peer's channel. The lock scopes a
/// single `send_*`/`receive_once`/`drain_one` call; the host decides how
/// many tasks hold a clone of the `Arc`.
pub type ChannelHandle = Arc<Mutex<Channel<TcpStream>>>;

/// `-1` means unlimited, matching `spec`'s external-interface default.
pub const UNLIMITED_CLIENTS: i64 = -1;

/// Accepts inbound TCP connections and wraps each into a [`Channel`],
/// rejecting connections past `max_clients`.
pub struct Server {
    listener: TcpListener,
    max_clients: i64,
    peers: Mutex<HashMap<SocketAddr, ChannelHandle>>,
}

impl Server {
    /// Bind `addr` (e.g. `"127.0.0.1:0"` for an OS-assigned port).
    pub async fn bind(addr: &str, max_clients: i64) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(local_addr = %listener.local_addr()?, "xen server listening");
        Ok(Self {
            listener,
            max_clients,
            peers: Mutex::new(HashMap::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.lock().await.len()
    }

    fn at_capacity(&self, current: usize) -> bool {
        self.max_clients >= 0 && current as i64 >= self.max_clients
    }

    /// Accept exactly one connection. Returns `Ok(None)` if it was turned
    /// away for capacity (after writing `ERR:0:capacity-exhausted` to it);
    /// otherwise returns the new peer's address and a handle to its
    /// channel, already inserted into the peer map.
    pub async fn accept(&self) -> Result<Option<(SocketAddr, ChannelHandle)>> {
        let (mut stream, peer_addr) = self.listener.accept().await?;

        let current = self.peers.lock().await.len();
        if self.at_capacity(current) {
            warn!(%peer_addr, max_clients = self.max_clients, "rejecting peer, at capacity");
            let envelope = content::format(Category::Fail, 0, "capacity-exhausted");
            let payload = codec::encode_text(&envelope, "iso8859-1")?;
            // Best-effort: a peer that's about to be dropped anyway
            // shouldn't turn a write failure into a accept-loop error.
            let _ = codec::write_frame_async(&mut stream, &payload).await;
            return Ok(None);
        }

        info!(%peer_addr, "peer connected");
        let channel = Arc::new(Mutex::new(Channel::new(stream)));
        self.peers.lock().await.insert(peer_addr, channel.clone());
        Ok(Some((peer_addr, channel)))
    }

    /// Drop a peer from the tracked set once its channel closes. Does not
    /// error if the peer was already removed.
    pub async fn remove_peer(&self, peer_addr: SocketAddr) {
        self.peers.lock().await.remove(&peer_addr);
    }

    /// Mark every tracked peer's channel closed, then drop them all.
    /// Consumes `self` so the listener is also dropped afterward, matching
    /// the "destroy all peer Channels, then close the listener" ordering.
    pub async fn close(self) {
        let mut peers = self.peers.lock().await;
        for (_, channel) in peers.drain() {
            channel.lock().await.close();
        }
    }
}

/// A single outbound connection to a Xen server.
pub struct Client {
    channel: Channel<TcpStream>,
}

impl Client {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(XenError::Transport)?;
        Ok(Self {
            channel: Channel::new(stream),
        })
    }

    pub fn channel(&mut self) -> &mut Channel<TcpStream> {
        &mut self.channel
    }

    pub fn into_channel(self) -> Channel<TcpStream> {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Dispatcher;
    use crate::evaluator::EchoEvaluator;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn accepts_within_capacity() {
        let server = Server::bind("127.0.0.1:0", 2).await.unwrap();
        let addr = server.local_addr().unwrap();

        let client_task = tokio::spawn(async move { Client::connect(&addr.to_string()).await });

        let (_peer_addr, _handle) = server.accept().await.unwrap().expect("should be accepted");
        client_task.await.unwrap().unwrap();
        assert_eq!(server.peer_count().await, 1);
    }

    #[tokio::test]
    async fn rejects_past_capacity() {
        let server = Server::bind("127.0.0.1:0", 0).await.unwrap();
        let addr = server.local_addr().unwrap();

        let client_task = tokio::spawn(async move { Client::connect(&addr.to_string()).await });
        let result = server.accept().await.unwrap();
        assert!(result.is_none());
        client_task.await.unwrap().unwrap();
        assert_eq!(server.peer_count().await, 0);
    }

    struct CaptureDispatcher {
        results: Arc<StdMutex<Vec<(u64, String)>>>,
    }

    impl Dispatcher for CaptureDispatcher {
        fn on_event(&mut self, _serial: u64, _text: &str) {}
        fn on_result(&mut self, serial: u64, text: &str) {
            self.results.lock().unwrap().push((serial, text.to_string()));
        }
        fn on_error(&mut self, _serial: u64, _text: &str) {}
        fn on_unknown_category(&mut self, _category: &str, _serial: u64, _text: &str) {}
        fn on_raw(&mut self, _payload: &[u8]) {}
    }

    #[tokio::test]
    async fn command_round_trip_over_real_socket() {
        let server = Server::bind("127.0.0.1:0", UNLIMITED_CLIENTS).await.unwrap();
        let addr = server.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (_peer, handle) = server.accept().await.unwrap().unwrap();
            let mut channel = handle.lock().await;
            channel.set_evaluator(Box::new(EchoEvaluator));
            channel.receive_once().await.unwrap();
            channel.drain_one().await.unwrap();
        });

        let mut client = Client::connect(&addr.to_string()).await.unwrap();
        let serial = client.channel().send_command("ping").await.unwrap();
        server_task.await.unwrap();

        let results = Arc::new(StdMutex::new(Vec::new()));
        client
            .channel()
            .set_dispatcher(Some(Box::new(CaptureDispatcher {
                results: results.clone(),
            })));
        client.channel().receive_once().await.unwrap();
        client.channel().drain_one().await.unwrap();

        assert_eq!(results.lock().unwrap()[0], (serial, "ping".to_string()));
    }
}
