//! Binary entry point for the `truevirt` CLI.
//!
//! Every invocation prints exactly one JSON document on stdout. Failures are
//! reported as `{"failed": true, "changed": false, "msg": ...}` with exit
//! status 1; logs go to stderr.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::process;
use std::time::Duration;

use clap::Parser;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::Level;

use truevirt::config::{ApiConfig, ConfigError};
use truevirt::exec::{self, ExecCommand, ExecParams, ExecRequest};
use truevirt::instance::{InstanceSpec, InstanceType};
use truevirt::reconcile::{DesiredState, InstanceParams, PollTimeoutPolicy, Reconciler, RunMode};
use truevirt::telemetry::{get_subscriber, init_subscriber};
use truevirt::transport::{ConfiguredTransport, Transport};
use truevirt::{VirtClient, VirtError};

mod cli;

use cli::{Cli, ExecCommandArgs, InstanceCommand, OnTimeoutArg, StateArg, TypeArg};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Virt(#[from] VirtError),
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// JSON document to print and the process exit status.
#[derive(Debug, PartialEq)]
struct Report {
    document: Value,
    exit_code: i32,
}

impl Report {
    const fn success(document: Value) -> Self {
        Self {
            document,
            exit_code: 0,
        }
    }

    fn failure(err: &CliError) -> Self {
        Self {
            document: json!({"failed": true, "changed": false, "msg": err.to_string()}),
            exit_code: 1,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_subscriber(get_subscriber(Level::WARN, io::stderr)) {
        writeln!(io::stderr(), "{err}").ok();
    }

    let report = dispatch(cli)
        .await
        .unwrap_or_else(|err| Report::failure(&err));
    write_document(io::stdout(), &report.document);
    process::exit(report.exit_code);
}

async fn dispatch(cli: Cli) -> Result<Report, CliError> {
    let config = ApiConfig::load_without_cli_args()?;
    let transport = ConfiguredTransport::from_config(&config)?;
    let client = VirtClient::new(transport).with_poll_interval(config.poll_interval());

    match cli {
        Cli::Instance(args) => run_instance(client, &args).await,
        Cli::Exec(args) => run_exec(&client, &args).await,
    }
}

async fn run_instance<T: Transport>(
    client: VirtClient<T>,
    args: &InstanceCommand,
) -> Result<Report, CliError> {
    let params = instance_params(args);
    let outcome = Reconciler::new(client)
        .reconcile(&params, run_mode(args.check))
        .await?;
    Ok(Report::success(serde_json::to_value(outcome)?))
}

async fn run_exec<T: Transport>(
    client: &VirtClient<T>,
    args: &ExecCommandArgs,
) -> Result<Report, CliError> {
    let params = exec_params(args);
    let outcome = exec::run(client, &params, run_mode(args.check)).await?;
    let failed = outcome.failed();
    let mut document = serde_json::to_value(outcome)?;
    if failed && let Some(object) = document.as_object_mut() {
        object.insert(String::from("failed"), Value::Bool(true));
    }
    Ok(Report {
        document,
        exit_code: i32::from(failed),
    })
}

fn instance_params(args: &InstanceCommand) -> InstanceParams {
    let spec = InstanceSpec {
        instance_type: match args.instance_type {
            TypeArg::Container => InstanceType::Container,
            TypeArg::Vm => InstanceType::Vm,
        },
        source: args.source.clone(),
        config: args.config.clone(),
        devices: args.devices.clone(),
        ..InstanceSpec::new(args.name.clone())
    };
    let state = match args.state {
        StateArg::Present => DesiredState::Present,
        StateArg::Absent => DesiredState::Absent,
        StateArg::Started => DesiredState::Started,
        StateArg::Stopped => DesiredState::Stopped,
        StateArg::Restarted => DesiredState::Restarted,
    };
    InstanceParams {
        wait_for_ipv4: args.wait_for_ipv4,
        timeout: Duration::from_secs(args.timeout),
        on_timeout: match args.on_timeout {
            OnTimeoutArg::Warn => PollTimeoutPolicy::Warn,
            OnTimeoutArg::Fail => PollTimeoutPolicy::Fail,
            OnTimeoutArg::Ignore => PollTimeoutPolicy::Ignore,
        },
        ..InstanceParams::new(spec, state)
    }
}

fn exec_params(args: &ExecCommandArgs) -> ExecParams {
    let command = args.shell.as_ref().map_or_else(
        || ExecCommand::Argv(args.argv.clone()),
        |script| ExecCommand::Shell(script.clone()),
    );
    let request = ExecRequest {
        chdir: args.chdir.clone(),
        environment: args.env.iter().cloned().collect::<BTreeMap<_, _>>(),
        ..ExecRequest::new(command).with_timeout(Duration::from_secs(args.timeout))
    };
    ExecParams {
        name: args.name.clone(),
        request,
        creates: args.creates.clone(),
        removes: args.removes.clone(),
    }
}

const fn run_mode(check: bool) -> RunMode {
    if check { RunMode::Check } else { RunMode::Apply }
}

fn write_document(mut target: impl Write, document: &Value) {
    writeln!(target, "{document}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
