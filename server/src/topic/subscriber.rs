//! One writer task per subscriber: each task blocks on its own channel and
//! exits as soon as it's closed, so a slow or gone subscriber can never
//! stall delivery to anyone else.

use broker_protocol::Endpoint;
use log::{trace, warn};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

pub fn spawn_writer(
    socket: Arc<UdpSocket>,
    endpoint: Endpoint,
    mut rx: UnboundedReceiver<Vec<u8>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match socket.send_to(&frame, endpoint.addr()).await {
                Ok(_) => trace!("sent {} bytes to {endpoint}", frame.len()),
                Err(e) => warn!("failed to send to {endpoint}: {e}"),
            }
        }
        trace!("writer task for {endpoint} exiting");
    })
}
