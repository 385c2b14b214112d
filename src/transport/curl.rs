//! Transport that shells out to `curl` for each request.
//!
//! The HTTP status is recovered from a `--write-out` trailer appended to
//! stdout, so application-level 4xx/5xx responses keep their real status while
//! curl's own failures (DNS, TLS, refused connections, timeouts) are folded
//! into a transport failure.

use std::ffi::OsString;

use tokio::task;
use tracing::debug;

use crate::config::{ApiConfig, ConfigError};

use super::{ApiRequest, ApiResponse, CommandRunner, Transport, TransportFuture};

const STATUS_TRAILER: &str = "\n%{http_code}";

/// Runs `curl` through a [`CommandRunner`].
#[derive(Clone, Debug)]
pub struct CurlTransport<R: CommandRunner> {
    runner: R,
    curl_bin: String,
    base_url: String,
    api_key: String,
    insecure: bool,
}

impl<R: CommandRunner> CurlTransport<R> {
    /// Creates a transport using `runner` to spawn `curl`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when no API key is configured.
    pub fn new(config: &ApiConfig, runner: R) -> Result<Self, ConfigError> {
        Ok(Self {
            runner,
            curl_bin: config.curl_bin.trim().to_owned(),
            base_url: config.api_url.trim().to_owned(),
            api_key: config.api_key()?.to_owned(),
            insecure: config.accept_invalid_certs,
        })
    }

    /// Returns the runner, mainly so tests can inspect recorded calls.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    fn build_args(&self, request: &ApiRequest) -> Vec<OsString> {
        let mut args = vec![OsString::from("-sS")];
        if self.insecure {
            args.push(OsString::from("-k"));
        }
        args.push(OsString::from("-X"));
        args.push(OsString::from(request.method.as_str()));
        args.push(OsString::from("-H"));
        args.push(OsString::from(format!("Authorization: Bearer {}", self.api_key)));
        args.push(OsString::from("-H"));
        args.push(OsString::from("Content-Type: application/json"));
        if let Some(body) = request.wire_body() {
            args.push(OsString::from("-d"));
            args.push(OsString::from(body.to_string()));
        }
        args.push(OsString::from("--max-time"));
        args.push(OsString::from(request.timeout.as_secs().max(1).to_string()));
        args.push(OsString::from("--write-out"));
        args.push(OsString::from(STATUS_TRAILER));
        args.push(OsString::from(request.url(&self.base_url)));
        args
    }

    fn perform(&self, request: &ApiRequest) -> ApiResponse {
        let args = self.build_args(request);
        debug!(
            method = request.method.as_str(),
            path = %request.path,
            "invoking {}", self.curl_bin
        );
        let output = match self.runner.run(&self.curl_bin, &args) {
            Ok(output) => output,
            Err(err) => return ApiResponse::transport_failure(err.to_string()),
        };

        if !output.is_success() {
            let status_text = output
                .code
                .map_or_else(|| String::from("unknown"), |code| code.to_string());
            return ApiResponse::transport_failure(format!(
                "{} exited with status {status_text}: {}",
                self.curl_bin,
                output.stderr.trim()
            ));
        }

        parse_output(&output.stdout)
    }
}

fn parse_output(stdout: &str) -> ApiResponse {
    let (body, trailer) = stdout.rsplit_once('\n').unwrap_or(("", stdout));
    match trailer.trim().parse::<u16>() {
        Ok(status) if status > 0 => ApiResponse::from_server(status, body.to_owned()),
        _ => ApiResponse::transport_failure(format!(
            "curl produced no HTTP status (trailer '{}')",
            trailer.trim()
        )),
    }
}

impl<R: CommandRunner + Clone + 'static> Transport for CurlTransport<R> {
    fn call<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        let transport = self.clone();
        let request = request.clone();
        Box::pin(async move {
            // `curl` blocks until the response arrives.
            task::spawn_blocking(move || transport.perform(&request))
                .await
                .unwrap_or_else(|err| {
                    ApiResponse::transport_failure(format!("curl task failed: {err}"))
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;
    use crate::transport::{ResponseOrigin, TRANSPORT_FAILURE_STATUS};
    use serde_json::json;

    fn transport(runner: ScriptedRunner) -> CurlTransport<ScriptedRunner> {
        let config = ApiConfig {
            api_url: String::from("https://nas.local/api/v2.0"),
            api_key: Some(String::from("secret")),
            ..ApiConfig::default()
        };
        CurlTransport::new(&config, runner)
            .unwrap_or_else(|err| panic!("transport should build: {err}"))
    }

    fn args_of(runner: &ScriptedRunner) -> Vec<String> {
        runner
            .invocations()
            .first()
            .map(|call| {
                call.args
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn recovers_status_from_trailer() {
        let runner = ScriptedRunner::new();
        runner.push_output(Some(0), "[{\"id\":\"1\"}]\n200", "");
        let transport = transport(runner.clone());

        let response = transport.call(&ApiRequest::get("/virt/instance")).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!([{"id": "1"}]));
        assert_eq!(response.origin, ResponseOrigin::Server);
        let args = args_of(&runner);
        assert!(args.contains(&String::from("Authorization: Bearer secret")));
        assert_eq!(
            args.last().map(String::as_str),
            Some("https://nas.local/api/v2.0/virt/instance")
        );
    }

    #[tokio::test]
    async fn keeps_application_errors() {
        let runner = ScriptedRunner::new();
        runner.push_output(Some(0), "{\"message\":\"conflict\"}\n409", "");
        let transport = transport(runner);

        let response = transport.call(&ApiRequest::post("/virt/instance/1/start")).await;

        assert_eq!(response.status, 409);
        assert!(!response.is_transport_failure());
    }

    #[tokio::test]
    async fn curl_failure_becomes_transport_failure() {
        let runner = ScriptedRunner::new();
        runner.push_output(Some(7), "\n000", "curl: (7) Failed to connect");
        let transport = transport(runner);

        let response = transport.call(&ApiRequest::get("/virt/instance")).await;

        assert_eq!(response.status, TRANSPORT_FAILURE_STATUS);
        assert!(response.text.contains("Failed to connect"));
    }

    #[tokio::test]
    async fn spawn_failure_becomes_transport_failure() {
        let transport = transport(ScriptedRunner::new());

        let response = transport.call(&ApiRequest::get("/virt/instance")).await;

        assert!(response.is_transport_failure());
    }

    #[tokio::test]
    async fn sends_body_only_for_post() {
        let runner = ScriptedRunner::new();
        runner.push_output(Some(0), "{}\n201", "");
        let transport = transport(runner.clone());
        let request = ApiRequest::post("/virt/instance").with_body(json!({"name": "a"}));

        transport.call(&request).await;

        let args = args_of(&runner);
        let position = args.iter().position(|arg| arg == "-d");
        assert_eq!(
            position.and_then(|idx| args.get(idx + 1)).map(String::as_str),
            Some("{\"name\":\"a\"}")
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn runs_curl_off_the_async_worker() {
        let runner = ScriptedRunner::new();
        runner.push_output(Some(0), "[]\n200", "");
        let transport = transport(runner.clone());

        let worker = std::thread::current().id();
        let response = transport.call(&ApiRequest::get("/virt/instance")).await;

        assert_eq!(response.status, 200);
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert_ne!(
            invocations.first().map(|call| call.thread),
            Some(worker),
            "curl should run on the blocking pool"
        );
    }

    #[test]
    fn zero_status_is_not_a_response() {
        assert!(parse_output("\n000").is_transport_failure());
        assert!(parse_output("garbage").is_transport_failure());
    }
}
