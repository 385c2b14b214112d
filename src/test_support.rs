//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::transport::{
    ApiRequest, ApiResponse, CommandOutput, CommandRunner, Method, Transport, TransportError,
    TransportFuture,
};

/// Records a single request made through [`ScriptedTransport`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    /// HTTP method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<Value>,
    /// Request timeout.
    pub timeout: Duration,
}

#[derive(Debug, Default)]
struct TransportState {
    responses: VecDeque<ApiResponse>,
    fallback: Option<ApiResponse>,
    calls: Vec<RecordedCall>,
}

/// Transport returning pre-seeded responses in FIFO order.
///
/// When the queue is empty the fallback response is returned, or a transport
/// failure when none is configured.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
}

impl ScriptedTransport {
    /// Creates a transport with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the response returned once the queue is exhausted.
    #[must_use]
    pub fn with_fallback_json(self, status: u16, body: Value) -> Self {
        self.state().fallback = Some(ApiResponse::from_server(status, body.to_string()));
        self
    }

    /// Queues a response.
    pub fn push_response(&self, response: ApiResponse) {
        self.state().responses.push_back(response);
    }

    /// Queues a JSON response.
    pub fn push_json(&self, status: u16, body: Value) {
        self.push_response(ApiResponse::from_server(status, body.to_string()));
    }

    /// Queues a plain-text response.
    pub fn push_text(&self, status: u16, text: &str) {
        self.push_response(ApiResponse::from_server(status, text.to_owned()));
    }

    /// Queues a connection-level failure.
    pub fn push_transport_failure(&self, message: &str) {
        self.push_response(ApiResponse::transport_failure(message));
    }

    /// Returns a snapshot of all recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Returns the recorded `(method, path)` pairs.
    #[must_use]
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.calls()
            .into_iter()
            .map(|call| (call.method, call.path))
            .collect()
    }

    /// Returns the recorded paths.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.path).collect()
    }

    /// Returns the recorded calls that are not `GET`.
    #[must_use]
    pub fn mutations(&self) -> Vec<(Method, String)> {
        self.requests()
            .into_iter()
            .filter(|(method, _)| *method != Method::Get)
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn call<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        let response = {
            let mut state = self.state();
            state.calls.push(RecordedCall {
                method: request.method,
                path: request.path.clone(),
                body: request.body.clone(),
                timeout: request.timeout,
            });
            let fallback = state.fallback.clone();
            state.responses.pop_front().or(fallback).unwrap_or_else(|| {
                ApiResponse::transport_failure(format!(
                    "no scripted response for {} {}",
                    request.method.as_str(),
                    request.path
                ))
            })
        };
        Box::pin(async move { response })
    }
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Thread the runner was called on.
    pub thread: ThreadId,
}

#[derive(Debug, Default)]
struct RunnerState {
    responses: VecDeque<CommandOutput>,
    invocations: Vec<CommandInvocation>,
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    state: Arc<Mutex<RunnerState>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.state().invocations.clone()
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.state().responses.push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError> {
        let mut state = self.state();
        state.invocations.push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            thread: thread::current().id(),
        });
        state
            .responses
            .pop_front()
            .ok_or_else(|| TransportError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and clears environment variables while holding a global mutex.
    /// A `None` value removes the variable for the guard's lifetime.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
