use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn cli_chat_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("zonechat");

    let dir = tempfile::tempdir()?;
    let users_path = dir.path().join("users.toml");
    std::fs::write(&users_path, "[users]\nalice = \"12345\"\nbob = \"23456\"\n")?;
    let key_path = dir.path().join("hmac.key");
    std::fs::write(&key_path, "e2e-shared-secret\n")?;

    let (mut server, mut server_logs) = spawn_server(&binary, &users_path).await?;
    let chat_addr = read_banner_addr(&mut server_logs, "waiting for chat banner").await?;
    let udp_addr = read_banner_addr(&mut server_logs, "waiting for discovery banner").await?;

    // Drain further server logs in the background so the pipe never fills.
    let server_log_task = tokio::spawn(async move {
        drain(server_logs).await;
    });

    let mut alice = spawn_client(&binary, &chat_addr, &udp_addr, &key_path).await?;
    let mut bob = spawn_client(&binary, &chat_addr, &udp_addr, &key_path).await?;

    alice.send_line("!login alice 12345").await?;
    expect_line(&mut alice.stdout, "Successfully logged in.", "alice login").await?;
    bob.send_line("!login bob 23456").await?;
    expect_line(&mut bob.stdout, "Successfully logged in.", "bob login").await?;

    // Broadcast reaches bob but not alice; the cache holds it for !lastMsg.
    alice.send_line("!send Hello from Alice").await?;
    expect_line(&mut bob.stdout, "alice: Hello from Alice", "bob broadcast").await?;
    alice.send_line("!lastMsg").await?;
    expect_line(&mut alice.stdout, "alice: Hello from Alice", "alice lastMsg").await?;

    // Discovery over UDP returns the sorted online list.
    bob.send_line("!list").await?;
    expect_line(&mut bob.stdout, "alice", "list first entry").await?;
    expect_line(&mut bob.stdout, "bob", "list second entry").await?;

    // Bob opens a private-message listener; alice sends a tagged message.
    bob.send_line("!register 127.0.0.1:0").await?;
    let register_notice =
        read_line_expect(&mut bob.stdout, "waiting for bob register notice").await?;
    if !register_notice.starts_with("*** accepting private messages on ") {
        return Err(anyhow!("unexpected register notice: {register_notice}"));
    }
    expect_line(
        &mut bob.stdout,
        "Successfully registered address",
        "bob register reply",
    )
    .await?;

    alice.send_line("!msg bob Secret hi").await?;
    expect_line(&mut bob.stdout, "*** private message: Secret hi", "bob private").await?;
    expect_line(
        &mut alice.stdout,
        "*** bob acknowledged: Secret hi",
        "alice ack",
    )
    .await?;

    // The operator console sees both users online.
    server.send_line("!users").await?;
    expect_line(&mut server.stdout, "alice online", "users alice").await?;
    expect_line(&mut server.stdout, "bob online", "users bob").await?;

    alice.send_line("!exit").await?;
    bob.send_line("!exit").await?;
    ensure_success(&mut alice.child, "alice client").await?;
    ensure_success(&mut bob.child, "bob client").await?;

    server.send_line("!exit").await?;
    ensure_success(&mut server.child, "server").await?;
    let _ = server_log_task.await;

    Ok(())
}

struct Process {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Process {
    fn from_child(mut child: Child, name: &str) -> Result<Self> {
        let stdin = child
            .stdin
            .take()
            .with_context(|| format!("{name} stdin missing after spawn"))?;
        let stdout = child
            .stdout
            .take()
            .with_context(|| format!("{name} stdout missing after spawn"))?;
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

/// Spawns the server with stderr piped: the listening banners are log
/// lines, and logs go to stderr while stdout is the operator console.
async fn spawn_server(binary: &Path, users: &Path) -> Result<(Process, BufReader<ChildStderr>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("server")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .arg("--discovery")
        .arg("127.0.0.1:0")
        .arg("--users")
        .arg(users)
        .env("RUST_LOG_STYLE", "never")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("failed to spawn server")?;
    let stderr = child
        .stderr
        .take()
        .context("server stderr missing after spawn")?;
    let process = Process::from_child(child, "server")?;
    Ok((process, BufReader::new(stderr)))
}

async fn spawn_client(
    binary: &Path,
    server_addr: &str,
    discovery_addr: &str,
    key: &Path,
) -> Result<Process> {
    let mut cmd = Command::new(binary);
    cmd.arg("client")
        .arg("--server")
        .arg(server_addr)
        .arg("--discovery")
        .arg(discovery_addr)
        .arg("--key")
        .arg(key)
        .env("RUST_LOG", "warn")
        .env("RUST_LOG_STYLE", "never")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let child = cmd.spawn().context("failed to spawn client")?;
    Process::from_child(child, "client")
}

/// Reads the next banner line and returns its trailing socket address.
async fn read_banner_addr<R>(reader: &mut R, description: &str) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line_expect(reader, description).await?;
    let addr = line
        .split_whitespace()
        .last()
        .with_context(|| format!("{description}: unexpected banner format"))?;
    if !addr.contains(':') {
        return Err(anyhow!("{description}: banner missing socket: {line}"));
    }
    Ok(addr.to_string())
}

async fn expect_line<R>(reader: &mut R, needle: &str, description: &str) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line_expect(reader, description).await?;
    if line.contains(needle) {
        return Ok(());
    }
    Err(anyhow!("{description}: expected '{needle}', got '{line}'"))
}

async fn read_line_expect<R>(reader: &mut R, description: &str) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    match read_line(reader).await {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(anyhow!("{description}: stream closed")),
        Err(err) => Err(err.context(format!("{description}: failed to read line"))),
    }
}

async fn read_line<R>(reader: &mut R) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let bytes = match timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(result) => result?,
        Err(_) => return Err(anyhow!("timed out waiting for line")),
    };
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn drain<R>(mut reader: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut buffer = String::new();
    while reader
        .read_line(&mut buffer)
        .await
        .map(|bytes| {
            let has_data = bytes > 0;
            if has_data {
                buffer.clear();
            }
            has_data
        })
        .unwrap_or(false)
    {}
}

async fn ensure_success(child: &mut Child, name: &str) -> Result<()> {
    let status = timeout(READ_TIMEOUT, child.wait())
        .await
        .with_context(|| format!("{name} did not exit in time"))?
        .with_context(|| format!("failed to await {name} process"))?;
    if !status.success() {
        return Err(anyhow!("{name} exited with status {status}"));
    }
    Ok(())
}
