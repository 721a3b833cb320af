//! The Network Manager: owns the UDP socket, runs the ingest loop, and wires
//! shutdown so a signal unblocks the ingest read via `Router::close`.
//!
//! The egress side has no loop of its own — each subscriber gets its own
//! writer task (`topic::subscriber`), spawned on `Subscribe` and joined on
//! `Unsubscribe`/`Close` — so this module only drives ingest.

use crate::dispatch::{Collaborators, Dispatcher};
use crate::topic::{Router, BASIC_TOPIC};
use broker_protocol::Endpoint;
use broker_std::compression::Compression;
use log::{debug, trace, warn};
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Large enough for any command this broker recognizes; oversized datagrams
/// are truncated by the kernel and will simply fail to decode.
const DATAGRAM_BUFFER: usize = 64 * 1024;

pub struct NetworkManager {
    socket: Arc<UdpSocket>,
    compression: Arc<Compression>,
    router: Arc<Router>,
    dispatcher: Dispatcher,
    collaborators: Collaborators,
}

impl NetworkManager {
    pub fn new(
        socket: Arc<UdpSocket>,
        compression: Arc<Compression>,
        router: Arc<Router>,
        dispatcher: Dispatcher,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            socket,
            compression,
            router,
            dispatcher,
            collaborators,
        }
    }

    /// Reads datagrams until the router is closed, either by a `shutdown`
    /// command or by the caller racing this future against a signal and
    /// calling `Router::close` itself (see `main`). Racing the read against
    /// `Router::closed()` is what "unblocks the ingest read" in a runtime
    /// where a shared `UdpSocket` can't be half-closed out from under a
    /// concurrent reader.
    pub async fn run(&self) {
        let mut buf = vec![0u8; DATAGRAM_BUFFER];

        loop {
            tokio::select! {
                _ = self.router.closed() => break,
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, from)) => self.ingest_one(&buf[..len], from.into()).await,
                        Err(e) => warn!("ingest read failed: {e}"),
                    }
                }
            }
        }

        debug!("network manager ingest loop exiting");
    }

    async fn ingest_one(&self, frame: &[u8], source: Endpoint) {
        let bytes = match self.compression.unpack(frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("dropping datagram from {source}: failed to unpack: {e}");
                return;
            }
        };

        let mut command = match broker_protocol::decode(&bytes) {
            Ok(command) => command,
            Err(e) => {
                warn!("dropping datagram from {source}: {e}");
                return;
            }
        };
        command.source = Some(source);

        self.router.subscribe(BASIC_TOPIC, source).await;

        if let Err(e) = self.dispatcher.handle(&mut command, &self.collaborators).await {
            warn!("handler for '{}' from {source} failed: {e}", command.command);
        } else {
            trace!("dispatched '{}' from {source}", command.command);
        }
    }
}
