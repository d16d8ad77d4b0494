//! One zone node of the directory tree.
//!
//! A node owns two maps: delegated child zones (label to the child
//! node's socket address) and locally registered leaf users. Qualified
//! names are resolved right-to-left: the last label picks a child,
//! which receives the remaining prefix as a remote call, so
//! registration and lookup share one delegation path.

use std::{collections::HashMap, net::SocketAddr};

use tokio::sync::Mutex;
use tracing::info;

use crate::directory::{client, name::split_qualified, proto::DirectoryError};

pub struct ZoneNode {
    zone: String,
    children: Mutex<HashMap<String, SocketAddr>>,
    users: Mutex<HashMap<String, String>>,
}

impl ZoneNode {
    /// Creates a node for `zone`; `None` is the root.
    pub fn new(zone: Option<&str>) -> Self {
        Self {
            zone: zone.unwrap_or("root").to_string(),
            children: Mutex::new(HashMap::new()),
            users: Mutex::new(HashMap::new()),
        }
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Binds a single-label zone as a direct child, or forwards a
    /// longer name to the child owning its top label. Duplicate child
    /// labels are an error, not an overwrite.
    pub async fn register_nameserver(
        &self,
        zone: &str,
        handle: SocketAddr,
    ) -> Result<(), DirectoryError> {
        let (remainder, top) = split_qualified(zone)?;
        match remainder {
            None => {
                let mut children = self.children.lock().await;
                if children.contains_key(top) {
                    return Err(DirectoryError::AlreadyRegistered(top.to_string()));
                }
                children.insert(top.to_string(), handle);
                info!(zone = %self.zone, child = top, %handle, "delegated child zone");
                Ok(())
            }
            Some(remainder) => {
                let child = self.child(top).await?;
                client::register_nameserver(child, remainder, handle).await
            }
        }
    }

    /// Same delegation as [`Self::register_nameserver`], except a
    /// single-label name binds a leaf user and re-registration
    /// overwrites the stored address.
    pub async fn register_user(&self, name: &str, address: &str) -> Result<(), DirectoryError> {
        let (remainder, top) = split_qualified(name)?;
        match remainder {
            None => {
                let mut users = self.users.lock().await;
                users.insert(top.to_string(), address.to_string());
                info!(zone = %self.zone, user = top, address, "registered user");
                Ok(())
            }
            Some(remainder) => {
                let child = self.child(top).await?;
                client::register_user(child, remainder, address).await
            }
        }
    }

    /// Resolves a qualified leaf name to its address.
    pub async fn lookup(&self, name: &str) -> Result<String, DirectoryError> {
        let (remainder, top) = split_qualified(name)?;
        match remainder {
            None => self
                .users
                .lock()
                .await
                .get(top)
                .cloned()
                .ok_or_else(|| DirectoryError::UnknownUsername(top.to_string())),
            Some(remainder) => {
                let child = self.child(top).await?;
                client::lookup(child, remainder).await
            }
        }
    }

    /// Remote handle for an immediate child zone.
    pub async fn get_nameserver(&self, label: &str) -> Result<SocketAddr, DirectoryError> {
        if label.is_empty() || label.contains('.') {
            return Err(DirectoryError::InvalidDomain(label.to_string()));
        }
        self.child(label).await
    }

    async fn child(&self, label: &str) -> Result<SocketAddr, DirectoryError> {
        self.children
            .lock()
            .await
            .get(label)
            .copied()
            .ok_or_else(|| DirectoryError::InvalidDomain(label.to_string()))
    }

    /// Sorted child-zone lines for the operator console.
    pub async fn nameservers_dump(&self) -> Vec<String> {
        let children = self.children.lock().await;
        let mut lines: Vec<String> = children
            .iter()
            .map(|(label, handle)| format!("{label} {handle}"))
            .collect();
        lines.sort();
        lines
    }

    /// Sorted leaf-user lines for the operator console.
    pub async fn addresses_dump(&self) -> Vec<String> {
        let users = self.users.lock().await;
        let mut lines: Vec<String> = users
            .iter()
            .map(|(name, address)| format!("{name} {address}"))
            .collect();
        lines.sort();
        lines
    }
}
