use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server, accepting client connections and discovery queries.
    Server(ServerArgs),
    /// Connect to a chat server and relay console commands to it.
    Client(ClientArgs),
    /// Run one node of the hierarchical directory service.
    Nameserver(NameserverArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Socket address the chat server should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:6000")]
    pub listen: SocketAddr,

    /// Socket address the UDP discovery responder should bind to.
    #[arg(long, default_value = "127.0.0.1:6001")]
    pub discovery: SocketAddr,

    /// Path to the TOML credential file with the `[users]` table.
    #[arg(long)]
    pub users: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the chat server to connect to.
    #[arg(long, default_value = "127.0.0.1:6000")]
    pub server: SocketAddr,

    /// Address of the chat server's UDP discovery responder.
    #[arg(long, default_value = "127.0.0.1:6001")]
    pub discovery: SocketAddr,

    /// Path to the shared key file used to tag private messages.
    #[arg(long)]
    pub key: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct NameserverArgs {
    /// Socket address this directory node should bind to.
    #[arg(long, default_value = "127.0.0.1:7000")]
    pub listen: SocketAddr,

    /// Fully qualified zone this node is authoritative for.
    /// Omit to run the root node.
    #[arg(long, requires = "root")]
    pub zone: Option<String>,

    /// Address of the entry-point node (usually the root) to announce the zone to.
    #[arg(long)]
    pub root: Option<SocketAddr>,
}
