//! ngrok agent driver.
//!
//! # Responsibilities
//! - Spawn `ngrok http host:port` with JSON logging on stdout
//! - Wait for the `started tunnel` record and return its `url`
//! - Treat `eror`/`crit` records as establishment failures
//! - Kill the agent on request and report when it exits
//!
//! # Design Decisions
//! - The child is owned by a waiter task; `kill()` reaches it through a
//!   cancellation token and `closed()` through a watch channel
//! - stdout is drained for the whole session so the agent never blocks on a full pipe

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::NgrokSettings;
use crate::tunnel::{TunnelError, TunnelProvider, TunnelRequest};

/// Upper bound on waiting for the agent to exit after a kill.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// One record of `--log-format json` output.
#[derive(Debug, Deserialize)]
struct LogRecord {
    #[serde(default)]
    lvl: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    err: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AgentEvent {
    Started(String),
    Failed(String),
}

fn parse_log_line(line: &str) -> Option<AgentEvent> {
    let record: LogRecord = serde_json::from_str(line).ok()?;
    if record.msg == "started tunnel" {
        if let Some(url) = record.url {
            return Some(AgentEvent::Started(url));
        }
    }
    if record.lvl == "eror" || record.lvl == "crit" {
        let reason = record
            .err
            .filter(|e| !e.is_empty() && e != "<nil>")
            .unwrap_or(record.msg);
        return Some(AgentEvent::Failed(reason));
    }
    None
}

struct Session {
    kill: CancellationToken,
    exited: watch::Receiver<bool>,
}

/// [`TunnelProvider`] backed by the `ngrok` agent binary.
pub struct NgrokProvider {
    binary: PathBuf,
    config: Option<PathBuf>,
    region: Option<String>,
    startup_timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl NgrokProvider {
    pub fn new(settings: &NgrokSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
            config: settings.config.clone(),
            region: settings.region.clone(),
            startup_timeout: Duration::from_secs(settings.startup_timeout_secs),
            session: Mutex::new(None),
        }
    }

    fn command_args(&self, request: &TunnelRequest) -> Vec<String> {
        let mut args = vec![
            "http".to_string(),
            request.upstream(),
            "--authtoken".to_string(),
            request.auth_token.clone(),
            "--log".to_string(),
            "stdout".to_string(),
            "--log-format".to_string(),
            "json".to_string(),
        ];
        if let Some(config) = &self.config {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        args
    }

    fn take_session(&self) -> Option<Session> {
        self.session.lock().ok().and_then(|mut s| s.take())
    }

    async fn await_url(
        &self,
        events: &mut mpsc::Receiver<AgentEvent>,
    ) -> Result<String, TunnelError> {
        let wait = async {
            match events.recv().await {
                Some(AgentEvent::Started(url)) => Ok(url),
                Some(AgentEvent::Failed(reason)) => Err(TunnelError::Rejected(reason)),
                None => Err(TunnelError::Exited),
            }
        };
        tokio::time::timeout(self.startup_timeout, wait)
            .await
            .map_err(|_| TunnelError::Timeout(self.startup_timeout))?
    }
}

fn spawn_reader(stdout: ChildStdout, events: mpsc::Sender<AgentEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::trace!(target: "webhook_relay::ngrok", "{}", line);
            if let Some(event) = parse_log_line(&line) {
                if let AgentEvent::Failed(reason) = &event {
                    tracing::error!(reason = %reason, "ngrok reported an error");
                }
                // Only the first event matters to connect(); later ones are logged and dropped.
                let _ = events.try_send(event);
            }
        }
    });
}

fn spawn_waiter(mut child: Child, kill: CancellationToken, exited: watch::Sender<bool>) {
    tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => tracing::warn!(status = %status, "ngrok agent exited"),
                Err(e) => tracing::error!(error = %e, "Failed waiting on ngrok agent"),
            },
            _ = kill.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill ngrok agent");
                } else {
                    tracing::debug!("ngrok agent killed");
                }
            }
        }
        let _ = exited.send(true);
    });
}

#[async_trait]
impl TunnelProvider for NgrokProvider {
    async fn connect(&self, request: &TunnelRequest) -> Result<Url, TunnelError> {
        // A previous session, if any, is replaced.
        self.kill().await;

        let mut child = Command::new(&self.binary)
            .args(self.command_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TunnelError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        tracing::debug!(
            binary = %self.binary.display(),
            upstream = %request.upstream(),
            "ngrok agent spawned"
        );

        let (events_tx, mut events_rx) = mpsc::channel(1);
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, events_tx);
        }

        let kill = CancellationToken::new();
        let (exited_tx, exited_rx) = watch::channel(false);
        spawn_waiter(child, kill.clone(), exited_tx);
        if let Ok(mut session) = self.session.lock() {
            *session = Some(Session {
                kill,
                exited: exited_rx,
            });
        }

        let raw = match self.await_url(&mut events_rx).await {
            Ok(raw) => raw,
            Err(e) => {
                self.kill().await;
                return Err(e);
            }
        };
        match Url::parse(&raw) {
            Ok(url) => Ok(url),
            Err(_) => {
                self.kill().await;
                Err(TunnelError::InvalidUrl(raw))
            }
        }
    }

    async fn kill(&self) {
        let Some(session) = self.take_session() else {
            return;
        };
        session.kill.cancel();
        let mut exited = session.exited;
        if tokio::time::timeout(KILL_GRACE, exited.wait_for(|done| *done))
            .await
            .is_err()
        {
            tracing::warn!("ngrok agent did not exit within {:?}", KILL_GRACE);
        }
    }

    async fn closed(&self) {
        let exited = self
            .session
            .lock()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.exited.clone()));
        if let Some(mut exited) = exited {
            // An Err means the waiter is gone, which also means the agent is.
            let _ = exited.wait_for(|done| *done).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(settings: NgrokSettings) -> NgrokProvider {
        NgrokProvider::new(&settings)
    }

    #[test]
    fn test_started_tunnel_record() {
        let line = r#"{"addr":"http://127.0.0.1:8443","lvl":"info","msg":"started tunnel","name":"command_line","obj":"tunnels","t":"2024-05-01T10:00:00Z","url":"https://ab12.ngrok-free.app"}"#;
        assert_eq!(
            parse_log_line(line),
            Some(AgentEvent::Started("https://ab12.ngrok-free.app".into()))
        );
    }

    #[test]
    fn test_error_record() {
        let line = r#"{"lvl":"eror","msg":"session closing","err":"authentication failed: The authtoken you specified is invalid"}"#;
        match parse_log_line(line) {
            Some(AgentEvent::Failed(reason)) => assert!(reason.contains("authtoken")),
            other => panic!("unexpected {:?}", other),
        }

        let line = r#"{"lvl":"crit","msg":"command failed","err":"<nil>"}"#;
        assert_eq!(parse_log_line(line), Some(AgentEvent::Failed("command failed".into())));
    }

    #[test]
    fn test_uninteresting_lines() {
        assert_eq!(parse_log_line(r#"{"lvl":"info","msg":"client session established"}"#), None);
        assert_eq!(parse_log_line("not json at all"), None);
    }

    #[test]
    fn test_command_args() {
        let settings = NgrokSettings {
            config: Some(PathBuf::from("ngrok.yml")),
            region: Some("eu".into()),
            ..NgrokSettings::default()
        };
        let args = provider(settings).command_args(&TunnelRequest::new("127.0.0.1", 8443, "tok"));
        assert_eq!(
            args,
            vec![
                "http", "127.0.0.1:8443", "--authtoken", "tok", "--log", "stdout",
                "--log-format", "json", "--config", "ngrok.yml", "--region", "eu",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let settings = NgrokSettings {
            binary: PathBuf::from("/nonexistent/ngrok-binary"),
            ..NgrokSettings::default()
        };
        let err = provider(settings)
            .connect(&TunnelRequest::new("127.0.0.1", 8443, "tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Spawn { .. }));
    }

    #[cfg(unix)]
    fn fake_agent(dir: &tempfile::TempDir, body: &str) -> NgrokSettings {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("ngrok");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        NgrokSettings {
            binary: path,
            startup_timeout_secs: 5,
            ..NgrokSettings::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_agent_reports_url_then_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let settings = fake_agent(
            &dir,
            r#"echo '{"lvl":"info","msg":"client session established"}'
echo '{"lvl":"info","msg":"started tunnel","url":"https://ab12.ngrok-free.app"}'
exec sleep 30"#,
        );
        let provider = provider(settings);

        let url = provider
            .connect(&TunnelRequest::new("127.0.0.1", 8443, "tok"))
            .await
            .unwrap();
        assert_eq!(url.as_str(), "https://ab12.ngrok-free.app/");

        assert!(
            tokio::time::timeout(Duration::from_millis(200), provider.closed())
                .await
                .is_err(),
            "agent should still be running"
        );

        provider.kill().await;
        tokio::time::timeout(Duration::from_secs(2), provider.closed())
            .await
            .expect("closed() resolves after kill");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_agent_error_record_fails_connect() {
        let dir = tempfile::tempdir().unwrap();
        let settings = fake_agent(
            &dir,
            r#"echo '{"lvl":"eror","msg":"session closing","err":"authentication failed: invalid authtoken"}'
exec sleep 30"#,
        );
        let provider = provider(settings);

        let err = provider
            .connect(&TunnelRequest::new("127.0.0.1", 8443, "bad"))
            .await
            .unwrap_err();
        match err {
            TunnelError::Rejected(reason) => assert!(reason.contains("invalid authtoken")),
            other => panic!("unexpected {:?}", other),
        }
        // The failed session was torn down.
        tokio::time::timeout(Duration::from_secs(1), provider.closed())
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_agent_exit_before_url() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(fake_agent(&dir, "exit 1"));

        let err = provider
            .connect(&TunnelRequest::new("127.0.0.1", 8443, "tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Exited));
    }

    #[tokio::test]
    async fn test_kill_and_closed_without_session() {
        let provider = provider(NgrokSettings::default());
        provider.kill().await;
        provider.closed().await;
    }
}
