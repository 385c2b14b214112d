//! One-shot command execution inside a running instance.
//!
//! Commands go through the instance `exec` endpoint and are normalised into
//! an [`ExecResult`]. The [`run`] task adds guard paths so that a command
//! which already did its work is not repeated.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shell_escape::unix::escape;
use tracing::{debug, info, instrument, warn};

use crate::client::{Lookup, VirtClient, action_path};
use crate::error::{Operation, VirtError};
use crate::reconcile::RunMode;
use crate::transport::{ApiRequest, Transport};

/// Command timeout used unless the caller overrides it.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(300);

/// Extra allowance on top of the command timeout for the HTTP round trip.
pub const EXEC_REQUEST_GRACE: Duration = Duration::from_secs(10);

/// Timeout for guard path probes.
pub const PATH_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const SHELL: &str = "/bin/sh";

/// Command to run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecCommand {
    /// Shell snippet, run through `/bin/sh -c`.
    Shell(String),
    /// Argument vector, sent verbatim.
    Argv(Vec<String>),
}

impl ExecCommand {
    /// Argument vector sent to the backend. `chdir` only applies to shell
    /// snippets.
    #[must_use]
    pub fn to_argv(&self, chdir: Option<&Utf8PathBuf>) -> Vec<String> {
        match self {
            Self::Shell(script) => {
                let script = chdir.map_or_else(
                    || script.clone(),
                    |dir| format!("cd {} && {script}", quote(dir.as_str())),
                );
                vec![SHELL.to_owned(), String::from("-c"), script]
            }
            Self::Argv(argv) => argv.clone(),
        }
    }
}

/// A command plus its execution context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecRequest {
    /// Command to run.
    pub command: ExecCommand,
    /// Working directory for shell snippets.
    pub chdir: Option<Utf8PathBuf>,
    /// Extra environment variables; omitted from the payload when empty.
    pub environment: BTreeMap<String, String>,
    /// Command timeout.
    pub timeout: Duration,
}

impl ExecRequest {
    /// Request for `command` with the default timeout.
    #[must_use]
    pub const fn new(command: ExecCommand) -> Self {
        Self {
            command,
            chdir: None,
            environment: BTreeMap::new(),
            timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }

    /// Shell snippet request.
    #[must_use]
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new(ExecCommand::Shell(script.into()))
    }

    /// Overrides the command timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Argument vector that will be sent.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        self.command.to_argv(self.chdir.as_ref())
    }

    fn payload(&self) -> serde_json::Value {
        let mut payload = json!({
            "command": self.argv(),
            "wait_for_websocket": false,
            "interactive": false,
            "timeout": self.timeout.as_secs(),
        });
        if !self.environment.is_empty()
            && let Some(object) = payload.as_object_mut()
        {
            object.insert(String::from("environment"), json!(self.environment));
        }
        payload
    }
}

/// Normalised command result.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExecResult {
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: String,
    /// Exit status of the command.
    #[serde(rename = "return")]
    pub rc: i32,
}

impl ExecResult {
    fn failure(stderr: String) -> Self {
        Self {
            stdout: String::new(),
            stderr,
            rc: 1,
        }
    }
}

impl<T: Transport> VirtClient<T> {
    /// Runs a command inside instance `id`.
    ///
    /// Failures never error: a non-200 status or an undecodable body yields
    /// return code 1 with the response text on stderr.
    #[instrument(skip(self, request), fields(timeout_secs = request.timeout.as_secs()))]
    pub async fn execute(&self, id: &str, request: &ExecRequest) -> ExecResult {
        let api_request = ApiRequest::post(action_path(id, Operation::Exec.as_str()))
            .with_body(request.payload())
            .with_timeout(request.timeout.saturating_add(EXEC_REQUEST_GRACE));
        let response = self.transport().call(&api_request).await;

        if !response.status_in(Operation::Exec.accepted_statuses()) {
            warn!(status = response.status, "exec call failed");
            return ExecResult::failure(response.text);
        }
        match response.json::<ExecResult>() {
            Ok(result) => {
                debug!(rc = result.rc, "command finished");
                result
            }
            Err(err) => {
                warn!(error = %err, "exec response could not be decoded");
                ExecResult::failure(format!("malformed exec response: {err}"))
            }
        }
    }

    /// `true` when `path` exists inside instance `id`.
    pub async fn check_path_exists(&self, id: &str, path: &str) -> bool {
        let probe =
            ExecRequest::shell(format!("test -e {}", quote(path))).with_timeout(PATH_PROBE_TIMEOUT);
        self.execute(id, &probe).await.rc == 0
    }
}

/// Inputs to the exec task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecParams {
    /// Instance name.
    pub name: String,
    /// Command and context.
    pub request: ExecRequest,
    /// Skip when this path exists.
    pub creates: Option<String>,
    /// Skip when this path does not exist.
    pub removes: Option<String>,
}

/// Result record of the exec task.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ExecOutcome {
    /// Whether the command ran, or would run in check mode.
    pub changed: bool,
    /// Why the command did not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status; absent when the command did not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
    /// Argument vector sent, or that would have been sent.
    pub cmd: Vec<String>,
}

impl ExecOutcome {
    fn skipped(params: &ExecParams, changed: bool, msg: String) -> Self {
        Self {
            changed,
            msg: Some(msg),
            cmd: params.request.argv(),
            ..Self::default()
        }
    }

    /// `true` when the command ran and exited non-zero.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.rc.is_some_and(|rc| rc != 0)
    }
}

/// Looks up the instance, evaluates the guards and runs the command.
///
/// Guards are evaluated in check mode too, so a dry run reports the same
/// skip decision as a real one.
///
/// # Errors
///
/// Returns [`VirtError::InstanceNotFound`] when no instance carries the name
/// and [`VirtError::LookupFailed`] when the listing fails.
#[instrument(skip(client, params), fields(name = %params.name))]
pub async fn run<T: Transport>(
    client: &VirtClient<T>,
    params: &ExecParams,
    mode: RunMode,
) -> Result<ExecOutcome, VirtError> {
    let instance = match client.lookup(&params.name).await {
        Lookup::Found(instance) => instance,
        Lookup::NotFound => {
            return Err(VirtError::InstanceNotFound {
                name: params.name.clone(),
            });
        }
        Lookup::Failed { status, text } => return Err(VirtError::LookupFailed { status, text }),
    };

    if let Some(path) = &params.creates
        && client.check_path_exists(&instance.id, path).await
    {
        info!(%path, "guard path exists; skipping");
        return Ok(ExecOutcome::skipped(params, false, format!("{path} already exists")));
    }
    if let Some(path) = &params.removes
        && !client.check_path_exists(&instance.id, path).await
    {
        info!(%path, "guard path missing; skipping");
        return Ok(ExecOutcome::skipped(params, false, format!("{path} does not exist")));
    }

    if mode == RunMode::Check {
        return Ok(ExecOutcome::skipped(
            params,
            true,
            String::from("command would have run (check mode)"),
        ));
    }

    let result = client.execute(&instance.id, &params.request).await;
    Ok(ExecOutcome {
        changed: true,
        msg: None,
        stdout: result.stdout,
        stderr: result.stderr,
        rc: Some(result.rc),
        cmd: params.request.argv(),
    })
}

/// Single-quoted shell word. `escape` leaves safe text bare, so that case is
/// wrapped here.
fn quote(text: &str) -> String {
    let escaped = escape(Cow::Borrowed(text));
    if escaped.starts_with('\'') {
        escaped.into_owned()
    } else {
        format!("'{escaped}'")
    }
}
