//! Command-line interface definitions for the `truevirt` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! depends on `clap`, `camino` and `serde_json` only.

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use serde_json::{Map, Value};

/// Upper bound for `--timeout`, one day in seconds.
pub(crate) const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Top-level CLI for the `truevirt` binary.
#[derive(Debug, Parser)]
#[command(
    name = "truevirt",
    version,
    about = "Reconcile TrueNAS virtualization instances and run commands inside them",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Bring an instance into the requested state.
    #[command(name = "instance", about = "Bring an instance into the requested state")]
    Instance(InstanceCommand),
    /// Run a command inside a running instance.
    #[command(name = "exec", about = "Run a command inside a running instance")]
    Exec(ExecCommandArgs),
}

/// Requested instance state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum StateArg {
    /// Exists, whatever its status.
    Present,
    /// Does not exist.
    Absent,
    /// Exists and is running.
    Started,
    /// Exists and is stopped.
    Stopped,
    /// Restarted on every run.
    Restarted,
}

/// Workload kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum TypeArg {
    /// System container.
    #[value(name = "CONTAINER", alias = "container")]
    Container,
    /// Virtual machine.
    #[value(name = "VM", alias = "vm")]
    Vm,
}

/// Reaction to a status poll that gives up.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum OnTimeoutArg {
    /// Continue and report a warning.
    Warn,
    /// Fail the invocation.
    Fail,
    /// Continue silently.
    Ignore,
}

/// Arguments for the `truevirt instance` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct InstanceCommand {
    /// Instance name; the lookup key.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: String,
    /// Desired state.
    #[arg(long, value_enum, default_value_t = StateArg::Present)]
    pub(crate) state: StateArg,
    /// Workload kind used when creating the instance.
    #[arg(long = "type", value_enum, default_value_t = TypeArg::Container)]
    pub(crate) instance_type: TypeArg,
    /// Image source as a JSON object, passed through on creation.
    #[arg(long, value_name = "JSON", value_parser = parse_json)]
    pub(crate) source: Option<Value>,
    /// Configuration keys as a JSON object. A `boot.autostart` value of
    /// `"true"` starts the instance right after creating it.
    #[arg(long, value_name = "JSON", value_parser = parse_json_object)]
    pub(crate) config: Option<Map<String, Value>>,
    /// Devices as a JSON object.
    #[arg(long, value_name = "JSON", value_parser = parse_json_object)]
    pub(crate) devices: Option<Map<String, Value>>,
    /// Wait for an IPv4 address after starting the instance.
    #[arg(long)]
    pub(crate) wait_for_ipv4: bool,
    /// Seconds to wait for each status or address poll.
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(..=MAX_TIMEOUT_SECS)
    )]
    pub(crate) timeout: u64,
    /// What to do when a poll times out.
    #[arg(long, value_enum, default_value_t = OnTimeoutArg::Warn)]
    pub(crate) on_timeout: OnTimeoutArg,
    /// Report what would change without changing it.
    #[arg(long)]
    pub(crate) check: bool,
}

/// Arguments for the `truevirt exec` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ExecCommandArgs {
    /// Instance name.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: String,
    /// Working directory for `--shell` commands.
    #[arg(long, value_name = "DIR")]
    pub(crate) chdir: Option<Utf8PathBuf>,
    /// Environment variable for the command; repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub(crate) env: Vec<(String, String)>,
    /// Skip the command when this path exists in the instance.
    #[arg(long, value_name = "PATH")]
    pub(crate) creates: Option<String>,
    /// Skip the command when this path does not exist in the instance.
    #[arg(long, value_name = "PATH")]
    pub(crate) removes: Option<String>,
    /// Command timeout in seconds.
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS)
    )]
    pub(crate) timeout: u64,
    /// Report whether the command would run without running it.
    #[arg(long)]
    pub(crate) check: bool,
    /// Shell snippet, run through `/bin/sh -c`.
    #[arg(
        long,
        value_name = "STRING",
        conflicts_with = "argv",
        required_unless_present = "argv"
    )]
    pub(crate) shell: Option<String>,
    /// Argument vector, sent verbatim (after `--`).
    #[arg(last = true, value_name = "ARGV")]
    pub(crate) argv: Vec<String>,
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|err| format!("invalid JSON: {err}"))
}

fn parse_json_object(raw: &str) -> Result<Map<String, Value>, String> {
    match parse_json(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, got {other}")),
    }
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}
