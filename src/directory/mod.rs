//! Hierarchical directory (name) service.
//!
//! A tree of zone nodes maps fully qualified, dot-separated names to
//! addresses. Each node is authoritative for one zone: it holds its
//! delegated child zones and its local leaf users, and forwards
//! everything under a delegated label to the owning child by a remote
//! call. [`server`] hosts one node per process, [`client`] carries the
//! calls between them.

pub mod client;
pub mod name;
pub mod node;
pub mod proto;
pub mod server;

pub use node::ZoneNode;
pub use proto::{DirectoryError, DirectoryRequest, DirectoryResponse};
pub use server::Nameserver;
