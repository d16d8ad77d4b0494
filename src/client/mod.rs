//! Chat client: console REPL, server connection, UDP discovery, and the
//! private-message listener/sender.
//!
//! The server connection is read by a spawned task so that `!lookupSilent`
//! replies can be intercepted and fed to an in-flight `!msg` resolution
//! while everything else is rendered to the console.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream, UdpSocket,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    cli::ClientArgs,
    command::{
        ConsoleCommand, LIST_REQUEST, LOOKUP_RESULT_ERROR, LOOKUP_RESULT_PREFIX, ParseError,
    },
    integrity::MessageKey,
    wire::{read_line, write_line},
};

pub mod private;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_DATAGRAM_SIZE: usize = 1024;

/// Slot the server-reader task fulfils when a `!lookupResult` line
/// arrives while a private-message send is resolving its recipient.
type PendingLookup = Arc<Mutex<Option<oneshot::Sender<String>>>>;

pub async fn run(args: ClientArgs) -> Result<()> {
    let key = MessageKey::load(&args.key)?;
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    let pending: PendingLookup = Arc::default();
    let mut server_task = tokio::spawn(read_server_lines(
        BufReader::new(reader),
        Arc::clone(&pending),
    ));

    let discovery = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("failed to bind discovery socket")?;

    let mut client = Client {
        writer,
        discovery,
        discovery_addr: args.discovery,
        key,
        pending,
        listener: None,
    };

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    loop {
        input.clear();
        select! {
            _ = &mut server_task => {
                write_stdout("*** server closed the connection").await?;
                break;
            }
            bytes_read = stdin.read_line(&mut input) => {
                if !client.handle_console_line(bytes_read, &input).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    if let Some(listener) = client.listener.take() {
        listener.abort();
    }
    server_task.abort();
    if let Err(error) = client.writer.shutdown().await {
        debug!(?error, "failed to shutdown client writer cleanly");
    }

    Ok(())
}

struct Client {
    writer: OwnedWriteHalf,
    discovery: UdpSocket,
    discovery_addr: SocketAddr,
    key: MessageKey,
    pending: PendingLookup,
    listener: Option<JoinHandle<()>>,
}

impl Client {
    /// Handles one console line. Returns `Ok(false)` when the REPL
    /// should end.
    async fn handle_console_line(&mut self, bytes_read: io::Result<usize>, input: &str) -> Result<bool> {
        if bytes_read? == 0 {
            return Ok(false);
        }
        let line = input.trim();
        if line.is_empty() {
            return Ok(true);
        }

        let command = match ConsoleCommand::parse(line) {
            Ok(command) => command,
            Err(ParseError::Unknown) => {
                write_stdout("Unknown command!").await?;
                return Ok(true);
            }
            Err(err) => {
                write_stdout(&err.to_string()).await?;
                return Ok(true);
            }
        };

        match command {
            // Relayed verbatim; the reply arrives via the reader task.
            ConsoleCommand::Login { .. }
            | ConsoleCommand::Logout
            | ConsoleCommand::Send { .. }
            | ConsoleCommand::Lookup { .. }
            | ConsoleCommand::LastMsg => write_line(&mut self.writer, line).await?,
            ConsoleCommand::Register { address } => self.register(&address).await?,
            ConsoleCommand::List => self.query_list().await?,
            ConsoleCommand::Msg { recipient, text } => self.send_private(&recipient, &text).await?,
            ConsoleCommand::Exit => {
                write_line(&mut self.writer, "!exit").await?;
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Starts (or restarts) the private-message listener on `address`
    /// and registers the bound address with the chat server. Binding
    /// first means port 0 registers the actual ephemeral port.
    async fn register(&mut self, address: &str) -> Result<()> {
        match private::spawn_listener(address, self.key.clone()).await {
            Ok((addr, task)) => {
                if let Some(previous) = self.listener.replace(task) {
                    previous.abort();
                }
                write_stdout(&format!("*** accepting private messages on {addr}")).await?;
                write_line(&mut self.writer, &format!("!register {addr}")).await?;
            }
            Err(err) => write_stderr(&format!("!!! {err:#}")).await?,
        }
        Ok(())
    }

    async fn query_list(&mut self) -> Result<()> {
        self.discovery
            .send_to(LIST_REQUEST.as_bytes(), self.discovery_addr)
            .await?;

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        match timeout(REPLY_TIMEOUT, self.discovery.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => {
                let reply = String::from_utf8_lossy(&buf[..len]);
                if reply.trim().is_empty() {
                    write_stdout("*** nobody is online").await?;
                } else {
                    write_stdout(reply.trim_end()).await?;
                }
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => write_stderr("!!! discovery request timed out").await?,
        }
        Ok(())
    }

    /// Resolves a recipient's registered address through `!lookupSilent`,
    /// awaiting the intercepted `!lookupResult` reply.
    async fn resolve(&mut self, recipient: &str) -> Result<Option<String>> {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock().expect("pending lookup lock") = Some(tx);
        write_line(&mut self.writer, &format!("!lookupSilent {recipient}")).await?;

        match timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(payload)) if payload != LOOKUP_RESULT_ERROR => Ok(Some(payload)),
            Ok(Ok(_)) => Ok(None),
            Ok(Err(_)) | Err(_) => {
                self.pending.lock().expect("pending lookup lock").take();
                Ok(None)
            }
        }
    }

    async fn send_private(&mut self, recipient: &str, text: &str) -> Result<()> {
        let Some(address) = self.resolve(recipient).await? else {
            write_stderr(&format!("!!! {recipient} is not reachable")).await?;
            return Ok(());
        };

        match private::send_message(&address, &self.key, text).await {
            Ok(report) => {
                if !report.reply_authentic {
                    write_stderr(&format!(
                        "!!! reply from {recipient} failed verification; it was tampered with"
                    ))
                    .await?;
                }
                if report.receiver_acked {
                    write_stdout(&format!("*** {recipient} acknowledged: {}", report.text)).await?;
                } else {
                    write_stderr(&format!(
                        "!!! {recipient} reports the message arrived tampered"
                    ))
                    .await?;
                }
            }
            Err(err) => {
                write_stderr(&format!("!!! private message to {recipient} failed: {err:#}")).await?;
            }
        }
        Ok(())
    }
}

/// Renders pushed server lines, diverting `!lookupResult` replies to the
/// pending in-flight lookup instead of the console.
async fn read_server_lines(mut reader: BufReader<OwnedReadHalf>, pending: PendingLookup) {
    loop {
        match read_line(&mut reader).await {
            Ok(Some(line)) => {
                if let Some(payload) = line.strip_prefix(LOOKUP_RESULT_PREFIX) {
                    let sender = pending.lock().expect("pending lookup lock").take();
                    if let Some(sender) = sender {
                        let _ = sender.send(payload.to_string());
                        continue;
                    }
                }
                if write_stdout(&line).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(err) => {
                warn!(error = ?err, "failed to read from server");
                return;
            }
        }
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
