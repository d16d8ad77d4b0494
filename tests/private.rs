use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::{io::BufReader, net::TcpListener, time::timeout};
use zonechat::{
    client::private::{FrameKind, TaggedFrame, send_message, spawn_listener},
    integrity::MessageKey,
    wire::{read_line, write_line},
};

const STEP: Duration = Duration::from_secs(2);

fn shared_key() -> MessageKey {
    MessageKey::new(b"pre-distributed-between-clients").expect("key")
}

#[tokio::test]
async fn clean_round_trip_is_acknowledged() -> Result<()> {
    let key = shared_key();
    let (addr, listener) = spawn_listener("127.0.0.1:0", key.clone()).await?;

    let report = timeout(STEP, send_message(&addr.to_string(), &key, "hello bob")).await??;
    assert!(report.receiver_acked);
    assert!(report.reply_authentic);
    assert_eq!(report.text, "hello bob");

    listener.abort();
    Ok(())
}

#[tokio::test]
async fn altered_plaintext_is_reported_as_tampered() -> Result<()> {
    let key = shared_key();
    let (addr, listener) = spawn_listener("127.0.0.1:0", key.clone()).await?;

    // A man in the middle keeps the original tag but changes the text.
    let stream = tokio::net::TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let tag = key.tag("send 100 coins to alice");
    write_line(&mut writer, &format!("{tag} !msg send 100 coins to MALLORY")).await?;

    let reply = timeout(STEP, read_line(&mut reader))
        .await
        .context("reply timed out")??
        .ok_or_else(|| anyhow!("receiver closed without replying"))?;
    let frame = TaggedFrame::parse(&reply).expect("parseable reply");

    assert_eq!(frame.kind, FrameKind::Tampered);
    // The echoed text is still delivered, and the receiver's own tag
    // over it verifies.
    assert_eq!(frame.text, "send 100 coins to MALLORY");
    assert!(frame.verify(&key));

    listener.abort();
    Ok(())
}

#[tokio::test]
async fn corrupted_acknowledgment_fails_sender_verification() -> Result<()> {
    let key = shared_key();

    // A fake receiver acks with a garbage tag.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let fake = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let line = read_line(&mut reader).await.expect("read").expect("line");
        let frame = TaggedFrame::parse(&line).expect("parseable request");
        write_line(&mut writer, &format!("bm90LXRoZS10YWc= !ack {}", frame.text))
            .await
            .expect("write reply");
    });

    let report = timeout(STEP, send_message(&addr.to_string(), &key, "hello")).await??;
    assert!(report.receiver_acked);
    assert!(!report.reply_authentic);

    let _ = fake.await;
    Ok(())
}

#[tokio::test]
async fn mismatched_keys_tamper_both_directions() -> Result<()> {
    let sender_key = shared_key();
    let receiver_key = MessageKey::new(b"a-different-secret").expect("key");
    let (addr, listener) = spawn_listener("127.0.0.1:0", receiver_key).await?;

    let report = timeout(STEP, send_message(&addr.to_string(), &sender_key, "hello")).await??;
    assert!(!report.receiver_acked);
    assert!(!report.reply_authentic);
    assert_eq!(report.text, "hello");

    listener.abort();
    Ok(())
}

#[tokio::test]
async fn unreachable_recipient_fails_locally() {
    // Grab an address nobody is listening on anymore.
    let dead_addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("addr")
    };

    let result = send_message(&dead_addr.to_string(), &shared_key(), "hello").await;
    assert!(result.is_err());
}
