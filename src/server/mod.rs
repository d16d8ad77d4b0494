//! Chat server: accept loop, per-session tasks, broadcast fan-out, UDP
//! discovery, and the operator console.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::{TcpListener, TcpStream, UdpSocket},
    select,
    sync::watch,
};
use tracing::{info, warn};

use crate::cli::ServerArgs;

pub mod discovery;
pub mod session;
pub mod state;

pub use state::ServerState;

pub struct ChatServer {
    listener: TcpListener,
    socket: UdpSocket,
    state: Arc<ServerState>,
}

impl ChatServer {
    pub async fn bind(
        listen: SocketAddr,
        discovery: SocketAddr,
        state: ServerState,
    ) -> Result<Self> {
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("failed to bind chat listener on {listen}"))?;
        let socket = UdpSocket::bind(discovery)
            .await
            .with_context(|| format!("failed to bind discovery socket on {discovery}"))?;

        Ok(Self {
            listener,
            socket,
            state: Arc::new(state),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn discovery_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Serves connections and discovery queries until `shutdown`
    /// resolves, then signals every live session task and returns.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let ChatServer {
            listener,
            socket,
            state,
        } = self;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::pin!(shutdown);

        let discovery_task = tokio::spawn(discovery::run(
            socket,
            Arc::clone(&state),
            shutdown_rx.clone(),
        ));

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("chat server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &state, &shutdown_rx);
                }
            }
        }

        // Closes the discovery responder and drops every session out of
        // its select loop; in-flight fan-outs finish on their own.
        let _ = shutdown_tx.send(true);
        let _ = discovery_task.await;

        Ok(())
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    state: &Arc<ServerState>,
    shutdown: &watch::Receiver<bool>,
) {
    match result {
        Ok((stream, peer)) => {
            let state = Arc::clone(state);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(err) = session::run(stream, state, shutdown).await {
                    warn!(peer = %peer, error = ?err, "session closed with error");
                }
            });
        }
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

/// Binds the server from CLI arguments and serves until the operator
/// console reads `!exit` or the process receives ctrl-c.
pub async fn run(args: ServerArgs) -> Result<()> {
    let credentials = crate::config::load_credentials(&args.users)?;
    let server = ChatServer::bind(args.listen, args.discovery, ServerState::new(credentials)).await?;
    info!("chat server listening on {}", server.local_addr()?);
    info!("discovery responder on {}", server.discovery_addr()?);

    let state = server.state();
    server
        .run_until(async move {
            select! {
                _ = operator_console(state) => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        warn!(error = ?err, "failed to install ctrl-c handler");
                    }
                }
            }
        })
        .await
}

/// Reads operator commands from stdin; returns on `!exit` or EOF.
async fn operator_console(state: Arc<ServerState>) {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    loop {
        input.clear();
        match stdin.read_line(&mut input).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        match input.trim() {
            "" => {}
            "!exit" => return,
            "!users" => {
                for line in state.users_overview().await {
                    println!("{line}");
                }
            }
            _ => println!("Unknown command!"),
        }
    }
}
