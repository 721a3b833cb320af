//! The Subscription Table and Pub/Sub Router.
//!
//! `Router` owns the single mutex that guards topic membership; each
//! subscriber's outbound queue is an unbounded channel drained by its own
//! writer task (`topic::subscriber`), so a slow subscriber can never stall
//! `Publish`/`Unicast` for anyone else.

pub mod subscriber;

use crate::topic::subscriber::spawn_writer;
use broker_protocol::Endpoint;
use broker_std::compression::Compression;
use broker_std::errors::Result;
use futures::future::join_all;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Every broker instance binds senders to this topic on first contact.
pub const BASIC_TOPIC: &str = "basic";

struct Subscriber {
    endpoint: Endpoint,
    tx: UnboundedSender<Vec<u8>>,
}

type Table = HashMap<String, HashMap<String, Subscriber>>;

pub struct Router {
    socket: Arc<UdpSocket>,
    compression: Arc<Compression>,
    table: Mutex<Table>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl Router {
    pub fn new(socket: Arc<UdpSocket>, compression: Arc<Compression>) -> Self {
        Self {
            socket,
            compression,
            table: Mutex::new(HashMap::new()),
            handles: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once `close()` has run; the Network Manager races this
    /// against its ingest read so closing the router unblocks it without
    /// needing to actually tear down the socket.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }

    /// Idempotent: re-subscribing an already-present endpoint preserves its
    /// existing queue.
    pub async fn subscribe(&self, topic: &str, endpoint: Endpoint) {
        if self.is_closed() {
            return;
        }

        let mut table = self.table.lock().await;
        let topic_subs = table.entry(topic.to_string()).or_default();

        if topic_subs.contains_key(&endpoint.as_key()) {
            return;
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = spawn_writer(self.socket.clone(), endpoint, rx);
        self.handles.lock().await.push(handle);
        topic_subs.insert(endpoint.as_key(), Subscriber { endpoint, tx });
        debug!("subscribed {endpoint} to '{topic}'");
    }

    /// Removing the table entry drops its sender; the writer task observes
    /// the channel close on its next poll and exits.
    pub async fn unsubscribe(&self, topic: &str, endpoint: Endpoint) {
        let mut table = self.table.lock().await;
        if let Some(topic_subs) = table.get_mut(topic) {
            if topic_subs.remove(&endpoint.as_key()).is_some() {
                debug!("unsubscribed {endpoint} from '{topic}'");
            }
        }
    }

    /// Fans `bytes` out to every current subscriber of `topic`. Compression
    /// happens once, under the table lock; enqueueing into each
    /// subscriber's unbounded channel never blocks.
    pub async fn publish(&self, topic: &str, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        let table = self.table.lock().await;
        let Some(topic_subs) = table.get(topic) else {
            return Ok(());
        };

        let framed = self.compression.pack(bytes)?;
        for sub in topic_subs.values() {
            if sub.tx.send(framed.clone()).is_err() {
                warn!("subscriber {} dropped its receiver", sub.endpoint);
            }
        }

        Ok(())
    }

    /// Unicasts to a single subscriber of the default topic. A no-op (never
    /// a panic) if `endpoint` isn't currently subscribed.
    pub async fn unicast(&self, endpoint: Endpoint, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }

        let table = self.table.lock().await;
        let Some(sub) = table
            .get(BASIC_TOPIC)
            .and_then(|subs| subs.get(&endpoint.as_key()))
        else {
            return Ok(());
        };

        let framed = self.compression.pack(bytes)?;
        if sub.tx.send(framed).is_err() {
            warn!("subscriber {endpoint} dropped its receiver");
        }

        Ok(())
    }

    /// Sets the closed flag once, tears down every subscriber's queue so
    /// its writer task exits, then waits for all of them to finish.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.table.lock().await.clear();
        self.shutdown.cancel();

        let handles = std::mem::take(&mut *self.handles.lock().await);
        join_all(handles).await;
    }

    /// The set of endpoint strings currently subscribed to `basic`, for the
    /// `get clients` command.
    pub async fn client_addresses(&self) -> Vec<String> {
        let table = self.table.lock().await;
        table
            .get(BASIC_TOPIC)
            .map(|subs| subs.keys().cloned().collect())
            .unwrap_or_default()
    }
}
