//! Core library for the `truevirt` instance management tool.
//!
//! The crate reconciles TrueNAS virtualization instances (Incus containers
//! and VMs) towards a desired state over the appliance REST API, and runs
//! one-shot commands inside them. Requests go through a [`Transport`], with
//! a native HTTP implementation and one that shells out to `curl`.

pub mod client;
pub mod config;
pub mod error;
pub mod exec;
pub mod instance;
pub mod reconcile;
pub mod telemetry;
pub mod test_support;
pub mod transport;

pub use client::{Lookup, VirtClient};
pub use config::{ApiConfig, ConfigError};
pub use error::{Operation, VirtError};
pub use exec::{ExecCommand, ExecOutcome, ExecParams, ExecRequest, ExecResult};
pub use instance::{Instance, InstanceSpec, InstanceStatus, InstanceType};
pub use reconcile::{
    DesiredState, InstanceOutcome, InstanceParams, PollTimeoutPolicy, Reconciler, RunMode,
};
pub use transport::{ApiRequest, ApiResponse, ConfiguredTransport, Transport};
