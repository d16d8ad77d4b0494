//! Per-connection protocol engine.
//!
//! A session starts unauthenticated, accepts only `!login` until the
//! credentials check out, then serves the command set until `!logout`
//! (back to the login sub-protocol), `!exit`, or disconnection.

use std::sync::Arc;

use anyhow::Result;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::{mpsc, watch},
};
use tracing::{debug, info};

use crate::{
    command::{ChatCommand, LOOKUP_RESULT_ERROR, LOOKUP_RESULT_PREFIX, ParseError},
    server::state::{ServerState, SessionId},
    wire::write_line,
};

const LOGIN_OK: &str = "Successfully logged in.";
const LOGIN_FAILED: &str = "Wrong username or password.";
const LOGOUT_OK: &str = "Successfully logged out.";
const NOT_LOGGED_IN: &str = "You are not logged in. Please use !login first.";
const NO_ENTRY: &str = "No entry exists for this user.";
const NO_MESSAGE_YET: &str = "No message received yet.";
const EVICTED: &str = "Logged out: this account signed in from another connection.";

// Lines::next_line is cancel-safe, so a command whose bytes are still
// in flight survives the select racing it against broadcast pushes.
type Reader = Lines<BufReader<OwnedReadHalf>>;
type Writer = OwnedWriteHalf;

enum ServeOutcome {
    Logout,
    Evicted,
    Exit,
    Disconnect,
    Shutdown,
}

pub async fn run(
    stream: TcpStream,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader).lines();
    let mut writer = writer;

    loop {
        let Some((username, id, inbox)) =
            login_phase(&mut reader, &mut writer, &state, &mut shutdown).await?
        else {
            break;
        };
        info!(?peer, %username, "user logged in");

        let outcome = serve_phase(
            &mut reader,
            &mut writer,
            &state,
            &mut shutdown,
            &username,
            id,
            inbox,
        )
        .await?;

        match outcome {
            ServeOutcome::Logout | ServeOutcome::Evicted => continue,
            ServeOutcome::Exit | ServeOutcome::Disconnect | ServeOutcome::Shutdown => {
                info!(?peer, %username, "session closed");
                break;
            }
        }
    }

    Ok(())
}

/// Runs the login sub-protocol until a login succeeds. Returns `None`
/// once the peer disconnects or the server shuts down.
async fn login_phase(
    reader: &mut Reader,
    writer: &mut Writer,
    state: &ServerState,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<(String, SessionId, mpsc::UnboundedReceiver<String>)>> {
    loop {
        let line = select! {
            line = reader.next_line() => line?,
            _ = shutdown.changed() => return Ok(None),
        };
        let Some(line) = line else {
            return Ok(None);
        };
        if line.trim().is_empty() {
            continue;
        }

        match ChatCommand::parse(&line) {
            Ok(ChatCommand::Login { username, secret }) => {
                match state.login(&username, &secret).await {
                    Some((id, inbox)) => {
                        write_line(writer, LOGIN_OK).await?;
                        return Ok(Some((username, id, inbox)));
                    }
                    None => write_line(writer, LOGIN_FAILED).await?,
                }
            }
            Ok(ChatCommand::Exit) => return Ok(None),
            Err(err @ ParseError::Usage(_)) if line.starts_with("!login") => {
                write_line(writer, &err.to_string()).await?;
            }
            Ok(_) | Err(_) => write_line(writer, NOT_LOGGED_IN).await?,
        }
    }
}

/// Serves the authenticated command set until logout, exit, eviction,
/// disconnect, or server shutdown. Registry removal happens here for
/// every path that ends the authenticated phase.
async fn serve_phase(
    reader: &mut Reader,
    writer: &mut Writer,
    state: &ServerState,
    shutdown: &mut watch::Receiver<bool>,
    username: &str,
    id: SessionId,
    mut inbox: mpsc::UnboundedReceiver<String>,
) -> Result<ServeOutcome> {
    loop {
        select! {
            line = reader.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        state.logout(username, id).await;
                        debug!(%username, "connection dropped without !exit");
                        return Ok(ServeOutcome::Disconnect);
                    }
                    Err(err) => {
                        state.logout(username, id).await;
                        return Err(err.into());
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(outcome) = handle_command(&line, writer, state, username, id).await? {
                    return Ok(outcome);
                }
            }
            pushed = inbox.recv() => {
                match pushed {
                    Some(line) => write_line(writer, &line).await?,
                    None => {
                        // A later login for the same username took over the
                        // registry binding; treat it as an implicit logout.
                        write_line(writer, EVICTED).await?;
                        return Ok(ServeOutcome::Evicted);
                    }
                }
            }
            _ = shutdown.changed() => {
                state.logout(username, id).await;
                return Ok(ServeOutcome::Shutdown);
            }
        }
    }
}

async fn handle_command(
    line: &str,
    writer: &mut Writer,
    state: &ServerState,
    username: &str,
    id: SessionId,
) -> Result<Option<ServeOutcome>> {
    match ChatCommand::parse(line) {
        // !login is not part of the authenticated command set.
        Ok(ChatCommand::Login { .. }) => {
            write_line(writer, &ParseError::Unknown.to_string()).await?;
        }
        Ok(ChatCommand::Send { text }) => {
            state.broadcast(username, &text).await;
        }
        Ok(ChatCommand::Register { address }) => {
            state.register_address(username, &address).await;
            write_line(writer, &format!("Successfully registered address {address}.")).await?;
        }
        Ok(ChatCommand::Lookup { username: wanted }) => {
            match state.lookup_address(&wanted).await {
                Some(address) => write_line(writer, &address).await?,
                None => write_line(writer, NO_ENTRY).await?,
            }
        }
        Ok(ChatCommand::LookupSilent { username: wanted }) => {
            let payload = state
                .lookup_address(&wanted)
                .await
                .unwrap_or_else(|| LOOKUP_RESULT_ERROR.to_string());
            write_line(writer, &format!("{LOOKUP_RESULT_PREFIX}{payload}")).await?;
        }
        Ok(ChatCommand::LastMsg) => {
            let reply = state
                .last_message()
                .await
                .unwrap_or_else(|| NO_MESSAGE_YET.to_string());
            write_line(writer, &reply).await?;
        }
        Ok(ChatCommand::Logout) => {
            state.logout(username, id).await;
            write_line(writer, LOGOUT_OK).await?;
            return Ok(Some(ServeOutcome::Logout));
        }
        Ok(ChatCommand::Exit) => {
            state.logout(username, id).await;
            return Ok(Some(ServeOutcome::Exit));
        }
        Err(err) => {
            write_line(writer, &err.to_string()).await?;
        }
    }
    Ok(None)
}
