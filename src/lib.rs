//! A small distributed chat platform: chat server, client, and a
//! hierarchical directory (name) service, shipped as one binary with
//! three subcommands.
//!
//! Each module focuses on a concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for the three components.
//! - [`config`] loads the credential file the server authenticates against.
//! - [`command`] parses the chat wire commands and the client console
//!   commands.
//! - [`wire`] provides line-oriented async read/write helpers.
//! - [`integrity`] computes and verifies the HMAC tags carried on private
//!   messages.
//! - [`server`] accepts chat connections, runs the per-session protocol
//!   engine, broadcasts messages, and answers UDP discovery queries.
//! - [`client`] multiplexes console input, server pushes, discovery
//!   queries, and the private-message listener/sender.
//! - [`directory`] implements the delegation-based nameserver tree with
//!   recursive registration and lookup.
//!
//! Integration tests use this crate directly to exercise the session
//! protocol, the zone tree, and the private-message integrity workflow
//! over real sockets.

pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod directory;
pub mod integrity;
pub mod server;
pub mod wire;
