//! UDP discovery responder.
//!
//! Stateless request/response: `!list` returns the sorted online-user
//! list, one name per line; anything else returns the fixed unknown
//! token. Nothing is kept between queries.

use std::sync::Arc;

use tokio::{net::UdpSocket, select, sync::watch};
use tracing::{debug, warn};

use crate::{
    command::{LIST_REQUEST, UNKNOWN_DATAGRAM_REPLY},
    server::state::ServerState,
};

const MAX_DATAGRAM_SIZE: usize = 1024;

pub async fn run(socket: UdpSocket, state: Arc<ServerState>, mut shutdown: watch::Receiver<bool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, peer) = select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(err) => {
                    warn!(error = ?err, "discovery receive failed");
                    continue;
                }
            },
            _ = shutdown.changed() => return,
        };

        let request = String::from_utf8_lossy(&buf[..len]);
        let reply = match request.trim() {
            LIST_REQUEST => state.online_users().await.join("\n"),
            other => {
                debug!(%peer, request = %other, "unknown discovery request");
                UNKNOWN_DATAGRAM_REPLY.to_string()
            }
        };

        if let Err(err) = socket.send_to(reply.as_bytes(), peer).await {
            warn!(%peer, error = ?err, "failed to send discovery reply");
        }
    }
}
