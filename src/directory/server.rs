//! Nameserver: serves directory calls for one zone node and announces
//! its zone to an entry point (usually the root) at startup.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{info, warn};

use crate::{
    cli::NameserverArgs,
    directory::{
        client,
        node::ZoneNode,
        proto::{DirectoryRequest, DirectoryResponse, read_frame, write_frame},
    },
};

pub struct Nameserver {
    listener: TcpListener,
    node: Arc<ZoneNode>,
}

impl Nameserver {
    pub async fn bind(listen: SocketAddr, node: ZoneNode) -> Result<Self> {
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("failed to bind nameserver on {listen}"))?;
        Ok(Self {
            listener,
            node: Arc::new(node),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn node(&self) -> Arc<ZoneNode> {
        Arc::clone(&self.node)
    }

    /// Serves one directory call per accepted connection until
    /// `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Nameserver { listener, node } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!(zone = %node.zone(), "nameserver shutting down");
                    break;
                }
                accept_result = listener.accept() => match accept_result {
                    Ok((stream, peer)) => {
                        let node = Arc::clone(&node);
                        tokio::spawn(async move {
                            if let Err(err) = handle_call(stream, node).await {
                                warn!(peer = %peer, error = ?err, "directory call failed");
                            }
                        });
                    }
                    Err(err) => warn!(error = ?err, "failed to accept connection"),
                }
            }
        }

        Ok(())
    }
}

async fn handle_call(stream: TcpStream, node: Arc<ZoneNode>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let Some(request) = read_frame::<_, DirectoryRequest>(&mut reader).await? else {
        return Ok(());
    };
    let response = dispatch(&node, request).await;
    write_frame(&mut writer, &response).await?;
    Ok(())
}

async fn dispatch(node: &ZoneNode, request: DirectoryRequest) -> DirectoryResponse {
    let result = match request {
        DirectoryRequest::RegisterNameserver { zone, handle } => node
            .register_nameserver(&zone, handle)
            .await
            .map(|()| DirectoryResponse::Registered),
        DirectoryRequest::RegisterUser { name, address } => node
            .register_user(&name, &address)
            .await
            .map(|()| DirectoryResponse::Registered),
        DirectoryRequest::Lookup { name } => node
            .lookup(&name)
            .await
            .map(|address| DirectoryResponse::Address { address }),
        DirectoryRequest::GetNameserver { label } => node
            .get_nameserver(&label)
            .await
            .map(|handle| DirectoryResponse::Nameserver { handle }),
    };
    result.unwrap_or_else(|error| DirectoryResponse::Failed { error })
}

/// Binds one directory node from CLI arguments, announces its zone if it
/// is not the root, and serves until the operator console reads `!exit`
/// or the process receives ctrl-c.
pub async fn run(args: NameserverArgs) -> Result<()> {
    let server = Nameserver::bind(args.listen, ZoneNode::new(args.zone.as_deref())).await?;
    let addr = server.local_addr()?;
    info!("nameserver listening on {}", addr);

    if let Some(zone) = &args.zone {
        let root = args
            .root
            .ok_or_else(|| anyhow!("--zone requires --root to announce to"))?;
        client::register_nameserver(root, zone, addr)
            .await
            .map_err(|err| anyhow!("failed to register zone {zone}: {err}"))?;
        info!(%zone, entry = %root, "registered zone with entry point");
    }

    let node = server.node();
    server
        .run_until(async move {
            select! {
                _ = operator_console(node) => {}
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
async fn operator_console(node: Arc<ZoneNode>) {
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
            "!nameservers" => print_numbered(&node.nameservers_dump().await),
            "!addresses" => print_numbered(&node.addresses_dump().await),
            _ => println!("Unknown command!"),
        }
    }
}

fn print_numbered(lines: &[String]) {
    for (index, line) in lines.iter().enumerate() {
        println!("{}. {line}", index + 1);
    }
}
