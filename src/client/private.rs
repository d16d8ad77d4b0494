//! Direct client-to-client private messaging.
//!
//! One exchange per connection: the sender transmits `<tag> !msg <text>`,
//! the receiver verifies the tag, answers `<tag> !ack <text>` or
//! `<tag> !tampered <text>` with a tag of its own, and closes. Both ends
//! verify with the shared key from [`crate::integrity`].

use std::net::SocketAddr;

use anyhow::{Context, Result, bail};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    integrity::MessageKey,
    wire::{read_line, write_line},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Msg,
    Ack,
    Tampered,
}

impl FrameKind {
    fn token(self) -> &'static str {
        match self {
            Self::Msg => "!msg",
            Self::Ack => "!ack",
            Self::Tampered => "!tampered",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "!msg" => Some(Self::Msg),
            "!ack" => Some(Self::Ack),
            "!tampered" => Some(Self::Tampered),
            _ => None,
        }
    }
}

/// One line of the private-message protocol: tag, kind token, text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedFrame {
    pub tag: String,
    pub kind: FrameKind,
    pub text: String,
}

impl TaggedFrame {
    /// Builds a frame whose tag is computed over `text` with `key`.
    pub fn tagged(key: &MessageKey, kind: FrameKind, text: &str) -> Self {
        Self {
            tag: key.tag(text),
            kind,
            text: text.to_string(),
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, ' ');
        let tag = parts.next()?.to_string();
        let kind = FrameKind::from_token(parts.next()?)?;
        let text = parts.next()?.to_string();
        if tag.is_empty() || text.is_empty() {
            return None;
        }
        Some(Self { tag, kind, text })
    }

    pub fn render(&self) -> String {
        format!("{} {} {}", self.tag, self.kind.token(), self.text)
    }

    pub fn verify(&self, key: &MessageKey) -> bool {
        key.verify(&self.tag, &self.text)
    }
}

/// What the sender learned from one round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Text echoed back by the receiver.
    pub text: String,
    /// The receiver's verdict was `!ack` rather than `!tampered`.
    pub receiver_acked: bool,
    /// The reply's own tag verified against the echoed text.
    pub reply_authentic: bool,
}

/// Connects to a recipient's registered address and runs one tagged
/// message exchange.
pub async fn send_message(address: &str, key: &MessageKey, text: &str) -> Result<DeliveryReport> {
    let stream = TcpStream::connect(address)
        .await
        .with_context(|| format!("failed to connect to {address}"))?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let request = TaggedFrame::tagged(key, FrameKind::Msg, text);
    write_line(&mut writer, &request.render()).await?;

    let Some(reply) = read_line(&mut reader).await? else {
        bail!("peer closed the connection without replying");
    };
    let Some(frame) = TaggedFrame::parse(&reply) else {
        bail!("unparseable private-message reply: {reply}");
    };
    if frame.kind == FrameKind::Msg {
        bail!("peer replied with a fresh message instead of an acknowledgment");
    }

    Ok(DeliveryReport {
        receiver_acked: frame.kind == FrameKind::Ack,
        reply_authentic: frame.verify(key),
        text: frame.text,
    })
}

/// Binds the private-message listener and spawns its accept loop.
/// Returns the bound address and the task handle so a re-registration
/// can abort the previous listener.
pub async fn spawn_listener(address: &str, key: MessageKey) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind private-message listener on {address}"))?;
    let addr = listener.local_addr()?;
    let task = tokio::spawn(accept_loop(listener, key));
    Ok((addr, task))
}

async fn accept_loop(listener: TcpListener, key: MessageKey) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let key = key.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_exchange(stream, key).await {
                        debug!(%peer, error = ?err, "private-message exchange failed");
                    }
                });
            }
            Err(err) => {
                warn!(error = ?err, "private listener accept failed");
                return;
            }
        }
    }
}

async fn handle_exchange(stream: TcpStream, key: MessageKey) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let Some(line) = read_line(&mut reader).await? else {
        return Ok(());
    };
    let Some(frame) = TaggedFrame::parse(&line) else {
        bail!("unparseable private message: {line}");
    };
    if frame.kind != FrameKind::Msg {
        bail!("expected a !msg frame, got {}", frame.kind.token());
    }

    // The text is surfaced either way so the human can judge it.
    let verdict = if frame.verify(&key) {
        println!("*** private message: {}", frame.text);
        FrameKind::Ack
    } else {
        println!("!!! tampered private message: {}", frame.text);
        FrameKind::Tampered
    };

    let reply = TaggedFrame::tagged(&key, verdict, &frame.text);
    write_line(&mut writer, &reply.render()).await?;
    Ok(())
}
