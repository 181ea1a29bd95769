//! Client side of the session protocol: port discovery through the side
//! channel, one framed exchange per connection, and spawning the daemon as
//! a detached child of the `up` command.

use std::net::TcpStream;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::daemon::PORT_FILE;
use crate::protocol::{self, DaemonRequest, DaemonResponse};

const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
const SPAWN_WAIT: Duration = Duration::from_secs(5);

fn session_port(dir: &Path) -> anyhow::Result<u16> {
    let path = dir.join(PORT_FILE);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("no session found ({} is missing)", path.display()))?;
    text.trim()
        .parse()
        .with_context(|| format!("{} does not contain a port", path.display()))
}

fn connect(dir: &Path) -> anyhow::Result<TcpStream> {
    let port = session_port(dir)?;
    let stream = TcpStream::connect(("127.0.0.1", port))
        .context("session daemon is not reachable; is it still running?")?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    Ok(stream)
}

/// Send one request and read the single response. `query` disables the read
/// timeout because the daemon blocks on the remote model for however long it
/// takes; every other command answers from memory.
pub fn send_request(dir: &Path, request: &DaemonRequest) -> anyhow::Result<DaemonResponse> {
    let mut stream = connect(dir)?;
    let read_timeout = match request {
        DaemonRequest::Query { .. } => None,
        _ => Some(DEFAULT_READ_TIMEOUT),
    };
    stream.set_read_timeout(read_timeout)?;

    protocol::write_frame(&mut stream, request)?;
    protocol::read_frame(&mut stream)
}

/// A session counts as running when the port file resolves to a daemon that
/// accepts a connection. A stale port file alone does not.
pub fn is_daemon_running(dir: &Path) -> bool {
    let Ok(port) = session_port(dir) else {
        return false;
    };
    TcpStream::connect_timeout(
        &std::net::SocketAddr::from(([127, 0, 0, 1], port)),
        Duration::from_millis(500),
    )
    .is_ok()
}

/// Launch the daemon as a detached child running the hidden serve command,
/// then wait for its port file to appear.
pub fn spawn_daemon(dir: &Path, file: &Path, profile: &str) -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("failed to locate own executable")?;
    let child = Command::new(exe)
        .arg("session")
        .arg("serve")
        .arg(file)
        .arg("--profile")
        .arg(profile)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn session daemon")?;
    tracing::debug!("spawned session daemon pid {}", child.id());

    let deadline = Instant::now() + SPAWN_WAIT;
    while Instant::now() < deadline {
        if is_daemon_running(dir) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    anyhow::bail!("session daemon did not come up within {SPAWN_WAIT:?}")
}
