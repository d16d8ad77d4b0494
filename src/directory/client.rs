//! Typed call helpers for remote directory operations.
//!
//! Nodes use these to forward delegated operations to children; an
//! external resolver uses them against the root. Transport problems
//! surface as [`DirectoryError::CallFailed`] so they travel the same
//! path as structural errors.

use std::net::SocketAddr;

use tokio::{io::BufReader, net::TcpStream};

use crate::directory::proto::{
    DirectoryError, DirectoryRequest, DirectoryResponse, read_frame, write_frame,
};

/// One request/response exchange; every connection carries one call.
pub async fn call(
    addr: SocketAddr,
    request: &DirectoryRequest,
) -> Result<DirectoryResponse, DirectoryError> {
    let exchange = async {
        let stream = TcpStream::connect(addr).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        write_frame(&mut writer, request).await?;
        read_frame::<_, DirectoryResponse>(&mut reader).await
    };

    match exchange.await {
        Ok(Some(response)) => Ok(response),
        Ok(None) => Err(DirectoryError::CallFailed(format!(
            "{addr} closed the connection without replying"
        ))),
        Err(err) => Err(DirectoryError::CallFailed(format!(
            "call to {addr} failed: {err}"
        ))),
    }
}

pub async fn register_nameserver(
    addr: SocketAddr,
    zone: &str,
    handle: SocketAddr,
) -> Result<(), DirectoryError> {
    let request = DirectoryRequest::RegisterNameserver {
        zone: zone.to_string(),
        handle,
    };
    match call(addr, &request).await? {
        DirectoryResponse::Registered => Ok(()),
        DirectoryResponse::Failed { error } => Err(error),
        other => Err(unexpected(addr, &other)),
    }
}

pub async fn register_user(
    addr: SocketAddr,
    name: &str,
    address: &str,
) -> Result<(), DirectoryError> {
    let request = DirectoryRequest::RegisterUser {
        name: name.to_string(),
        address: address.to_string(),
    };
    match call(addr, &request).await? {
        DirectoryResponse::Registered => Ok(()),
        DirectoryResponse::Failed { error } => Err(error),
        other => Err(unexpected(addr, &other)),
    }
}

pub async fn lookup(addr: SocketAddr, name: &str) -> Result<String, DirectoryError> {
    let request = DirectoryRequest::Lookup {
        name: name.to_string(),
    };
    match call(addr, &request).await? {
        DirectoryResponse::Address { address } => Ok(address),
        DirectoryResponse::Failed { error } => Err(error),
        other => Err(unexpected(addr, &other)),
    }
}

pub async fn get_nameserver(addr: SocketAddr, label: &str) -> Result<SocketAddr, DirectoryError> {
    let request = DirectoryRequest::GetNameserver {
        label: label.to_string(),
    };
    match call(addr, &request).await? {
        DirectoryResponse::Nameserver { handle } => Ok(handle),
        DirectoryResponse::Failed { error } => Err(error),
        other => Err(unexpected(addr, &other)),
    }
}

fn unexpected(addr: SocketAddr, response: &DirectoryResponse) -> DirectoryError {
    DirectoryError::CallFailed(format!("unexpected response from {addr}: {response:?}"))
}
