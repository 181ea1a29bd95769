//! The session daemon: owns one conversation log and one codebase for its
//! whole process lifetime and serves framed commands over loopback TCP.
//!
//! The accept loop is deliberately sequential: one connection is accepted,
//! its single request fully handled (including the blocking remote call),
//! one response written, the connection closed. That serialization gives
//! every request a race-free view of session state without locks, at the
//! cost of queueing all clients behind the slowest in-flight request. A
//! `down` command is only honored between requests.

use std::collections::HashSet;
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Deserialize;

use crate::codebase::{self, FileRecord, FoldFile};
use crate::config::{Brief, ProfileConfig};
use crate::conversation::ConversationLog;
use crate::extract;
use crate::protocol::{self, DaemonRequest, DaemonResponse};
use crate::provider::LlmClient;
use crate::summary;

pub const PID_FILE: &str = ".sew_session.pid";
pub const PORT_FILE: &str = ".sew_session.port";
pub const META_FILE: &str = ".sew_session.json";

const DEFAULT_QUERY_OUTPUT: &str = "__temp.json";

#[derive(Deserialize)]
struct EditPayload {
    files: Vec<FileRecord>,
}

/// Aggregate root for one daemon process: the conversation log, the cached
/// codebase, and the configuration captured at startup. Constructed
/// explicitly so tests can drive independent sessions without sockets.
pub struct Session {
    dir: PathBuf,
    profile: ProfileConfig,
    brief: Option<Brief>,
    log: ConversationLog,
    codebase: Vec<FileRecord>,
}

impl Session {
    pub fn start(
        dir: &Path,
        initial_file: &Path,
        profile: ProfileConfig,
        brief: Option<Brief>,
    ) -> anyhow::Result<Self> {
        let fold = FoldFile::load(initial_file)?;
        let brief_message = brief.as_ref().and_then(|b| b.read_message(dir));
        let log = ConversationLog::initialize(
            profile.role(),
            brief_message,
            &fold.instruction_messages(),
            &fold.files,
        );
        let codebase = fold.files;
        codebase::save_cache(dir, &codebase);
        Ok(Self {
            dir: dir.to_path_buf(),
            profile,
            brief,
            log,
            codebase,
        })
    }

    /// Handle one request to completion. Never panics the daemon: any
    /// handler failure becomes an error response and the loop continues.
    pub fn handle(&mut self, request: DaemonRequest, client: &dyn LlmClient) -> DaemonResponse {
        let result = match request {
            DaemonRequest::List => Ok(self.list()),
            DaemonRequest::New { file } => self.renew(&file),
            DaemonRequest::Query {
                prompt,
                output,
                input_content,
            } => self.query(client, &prompt, output.as_deref(), input_content.as_deref()),
            DaemonRequest::Down => Ok(DaemonResponse::message("Shutting down")),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!("request failed: {e:#}");
            DaemonResponse::error(format!("{e:#}"))
        })
    }

    fn list(&self) -> DaemonResponse {
        DaemonResponse::List {
            files: self.codebase.iter().map(|f| f.path.clone()).collect(),
            instructions: self.log.snapshot_for_display(),
        }
    }

    /// Reload a fold file and rebuild the conversation. All fallible work
    /// happens before any mutation, so a bad file leaves state untouched.
    fn renew(&mut self, file: &str) -> anyhow::Result<DaemonResponse> {
        let fold = FoldFile::load(&self.dir.join(file))?;
        let brief_message = self.brief.as_ref().and_then(|b| b.read_message(&self.dir));
        self.log
            .renew(brief_message, &fold.instruction_messages(), &fold.files);
        self.codebase = fold.files;
        codebase::save_cache(&self.dir, &self.codebase);
        tracing::info!("session renewed from {file}");
        Ok(DaemonResponse::message(format!("Session renewed from {file}")))
    }

    fn query(
        &mut self,
        client: &dyn LlmClient,
        prompt: &str,
        output: Option<&str>,
        input_content: Option<&str>,
    ) -> anyhow::Result<DaemonResponse> {
        let output = output.unwrap_or(DEFAULT_QUERY_OUTPUT);

        self.log.append_query_turn(prompt, input_content);
        let started = Instant::now();
        let reply = client.complete(
            self.log.messages(),
            self.profile.model(),
            self.profile.temperature(),
        )?;
        let elapsed_secs = started.elapsed().as_secs_f64();
        self.log.append_assistant_reply(&reply);

        let (payload, message) = extract::extract(&reply);
        let output_path = self.dir.join(output);

        let summary = if payload.is_empty() {
            // Degraded path, not an error: a plain-text reply is written
            // verbatim as the artifact and nothing is applied.
            std::fs::write(&output_path, &reply)
                .with_context(|| format!("failed to write {}", output_path.display()))?;
            summary::NO_PAYLOAD_SUMMARY.to_string()
        } else {
            let parsed: EditPayload =
                serde_json::from_str(&payload).context("edit payload has malformed file records")?;
            let edits = codebase::filter_protected(parsed.files, &self.protected_paths());
            let summary = summary::change_summary(&self.codebase, &edits);
            self.codebase = codebase::apply_edits(&self.codebase, &edits);
            codebase::save_cache(&self.dir, &self.codebase);
            let artifact =
                serde_json::to_string_pretty(&serde_json::json!({ "files": edits }))?;
            std::fs::write(&output_path, artifact)
                .with_context(|| format!("failed to write {}", output_path.display()))?;
            summary
        };

        Ok(DaemonResponse::Query {
            message,
            summary,
            elapsed_secs,
        })
    }

    fn protected_paths(&self) -> HashSet<String> {
        self.brief.iter().map(|b| b.file.clone()).collect()
    }

    #[cfg(test)]
    pub fn codebase(&self) -> &[FileRecord] {
        &self.codebase
    }
}

/// Start a session and serve it until `down`. Side-channel files (port,
/// pid, metadata) are written once the listener is bound and removed on
/// clean shutdown; a startup failure removes whatever was partially
/// written before returning the error.
pub fn run(
    dir: &Path,
    initial_file: &Path,
    profile_name: &str,
    profile: ProfileConfig,
    brief: Option<Brief>,
    client: &dyn LlmClient,
) -> anyhow::Result<()> {
    let mut session = Session::start(dir, initial_file, profile, brief)?;

    let listener =
        TcpListener::bind(("127.0.0.1", 0)).context("failed to bind loopback listener")?;
    let port = listener
        .local_addr()
        .context("failed to read bound address")?
        .port();

    if let Err(e) = publish_side_channel(dir, port, profile_name, initial_file) {
        remove_side_channel(dir);
        return Err(e);
    }
    tracing::info!("session daemon listening on 127.0.0.1:{port}");

    loop {
        let stream = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(e) => {
                tracing::warn!("accept error: {e}");
                continue;
            }
        };
        if serve_connection(&mut session, stream, client) {
            break;
        }
    }

    remove_side_channel(dir);
    tracing::info!("session daemon stopped");
    Ok(())
}

/// One request/response exchange. Returns true when the daemon should
/// shut down. Transport errors are logged and the loop resumes; the peer
/// sees them as a connection failure.
fn serve_connection(session: &mut Session, mut stream: TcpStream, client: &dyn LlmClient) -> bool {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(30)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(30)));

    let body = match protocol::read_frame_bytes(&mut stream) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("dropping connection with unreadable request: {e:#}");
            return false;
        }
    };

    let parsed = serde_json::from_slice::<serde_json::Value>(&body)
        .map_err(|e| format!("invalid request: {e}"))
        .and_then(protocol::parse_request);
    let (response, down) = match parsed {
        Ok(request) => {
            let down = matches!(request, DaemonRequest::Down);
            (session.handle(request, client), down)
        }
        Err(message) => (DaemonResponse::error(message), false),
    };

    if let Err(e) = protocol::write_frame(&mut stream, &response) {
        tracing::warn!("failed to write response: {e:#}");
    }
    down
}

fn publish_side_channel(
    dir: &Path,
    port: u16,
    profile_name: &str,
    initial_file: &Path,
) -> anyhow::Result<()> {
    std::fs::write(dir.join(PORT_FILE), port.to_string())
        .context("failed to write session port file")?;
    std::fs::write(dir.join(PID_FILE), std::process::id().to_string())
        .context("failed to write session pid file")?;
    let meta = serde_json::json!({
        "profile": profile_name,
        "file": initial_file.display().to_string(),
        "started_at": chrono::Utc::now().to_rfc3339(),
    });
    std::fs::write(dir.join(META_FILE), serde_json::to_string_pretty(&meta)?)
        .context("failed to write session metadata file")?;
    Ok(())
}

fn remove_side_channel(dir: &Path) {
    for name in [PORT_FILE, PID_FILE, META_FILE] {
        let _ = std::fs::remove_file(dir.join(name));
    }
}
