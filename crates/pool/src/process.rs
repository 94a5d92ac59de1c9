//! The subprocess handle itself (§6): one long-lived LLM CLI process
//! spoken to over stdin/stdout, one JSON response per line.

use std::collections::HashMap;
use std::process::Stdio;

use orc_domain::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};

#[derive(Debug, Deserialize)]
pub struct ProcessResponse {
    pub response: String,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// What a caller needs to spawn an agent's subprocess (§4.4): command,
/// model, working directory, plus the already-resolved tier environment.
#[derive(Debug, Clone, Serialize)]
pub struct SpawnSpec {
    pub command: String,
    pub model: Option<String>,
    pub working_dir: Option<String>,
    pub env: HashMap<String, String>,
}

pub struct AgentProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl AgentProcess {
    pub fn spawn(spec: &SpawnSpec) -> Result<Self> {
        let mut cmd = tokio::process::Command::new(&spec.command);
        if let Some(model) = &spec.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::SubprocessCrash(format!("spawn {}: {e}", spec.command)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::SubprocessCrash("no stdin handle".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::SubprocessCrash("no stdout handle".into()))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// `true` unless the child has already exited.
    pub fn is_ready(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// One request per line on stdin, one JSON response per line on
    /// stdout (§6). A response body containing "busy" (case-sensitive
    /// substring per §4.2) is surfaced as `Error::SubprocessBusy`.
    pub async fn send_message(&mut self, prompt: &str) -> Result<ProcessResponse> {
        let mut line = prompt.replace('\n', " ");
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::SubprocessCrash(format!("write stdin: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| Error::SubprocessCrash(format!("flush stdin: {e}")))?;

        let mut out = String::new();
        let n = self
            .stdout
            .read_line(&mut out)
            .await
            .map_err(|e| Error::SubprocessCrash(format!("read stdout: {e}")))?;
        if n == 0 {
            return Err(Error::SubprocessCrash("subprocess closed stdout".into()));
        }
        if out.contains("busy") {
            return Err(Error::SubprocessBusy(out.trim().to_string()));
        }
        serde_json::from_str(&out).map_err(Error::from)
    }

    pub async fn stop(mut self) {
        let _ = self.child.kill().await;
    }
}
