//! Drives an instance towards a desired state.
//!
//! Reconciliation is a single lookup, a pure [`plan`] over the observation,
//! and (outside check mode) the execution of that plan against the API. The
//! outcome reports whether anything changed and the resulting record.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::client::{Lookup, VirtClient};
use crate::error::VirtError;
use crate::instance::{Instance, InstanceSpec};
use crate::transport::Transport;

mod plan;

pub use plan::{Action, DesiredState, Plan, PlanOptions, plan};

/// Default wait for status and address polls.
pub const DEFAULT_STATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Whether to mutate the backend or only report.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RunMode {
    /// Execute the plan.
    #[default]
    Apply,
    /// Report the plan without executing it.
    Check,
}

/// What to do when a status or address poll gives up.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PollTimeoutPolicy {
    /// Carry on silently.
    Ignore,
    /// Carry on and record a warning in the outcome.
    #[default]
    Warn,
    /// Fail the reconciliation.
    Fail,
}

/// Inputs to a reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceParams {
    /// Creation payload; its name identifies the instance.
    pub spec: InstanceSpec,
    /// Requested state.
    pub state: DesiredState,
    /// Wait for an IPv4 address after starting.
    pub wait_for_ipv4: bool,
    /// Upper bound on each poll.
    pub timeout: Duration,
    /// Behaviour when a poll gives up.
    pub on_timeout: PollTimeoutPolicy,
}

impl InstanceParams {
    /// Parameters for `spec` with the given state and default waits.
    #[must_use]
    pub const fn new(spec: InstanceSpec, state: DesiredState) -> Self {
        Self {
            spec,
            state,
            wait_for_ipv4: false,
            timeout: DEFAULT_STATE_TIMEOUT,
            on_timeout: PollTimeoutPolicy::Warn,
        }
    }

    /// Instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// Result of a reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InstanceOutcome {
    /// Whether a mutating action ran, or would run in check mode.
    pub changed: bool,
    /// Resulting record; `None` once the instance is gone.
    pub instance: Option<Instance>,
    /// Actions planned for this run, in order.
    pub planned_actions: Vec<String>,
    /// Poll timeouts tolerated under [`PollTimeoutPolicy::Warn`].
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Address found when waiting for IPv4.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
}

/// Reconciles instances through a [`VirtClient`].
#[derive(Clone, Debug)]
pub struct Reconciler<T> {
    client: VirtClient<T>,
}

impl<T: Transport> Reconciler<T> {
    /// Creates a reconciler.
    #[must_use]
    pub const fn new(client: VirtClient<T>) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &VirtClient<T> {
        &self.client
    }

    /// Brings the named instance into the requested state.
    ///
    /// In [`RunMode::Check`] only the lookup is performed and the outcome
    /// reports what would change.
    ///
    /// # Errors
    ///
    /// Returns [`VirtError::LookupFailed`] when the listing fails,
    /// [`VirtError::InstanceNotFound`] when a status change targets a
    /// missing instance, [`VirtError::Rejected`] when a mutating call is
    /// refused, and [`VirtError::PollTimeout`] when a poll gives up under
    /// [`PollTimeoutPolicy::Fail`].
    #[instrument(skip(self, params), fields(name = %params.name(), state = %params.state))]
    pub async fn reconcile(
        &self,
        params: &InstanceParams,
        mode: RunMode,
    ) -> Result<InstanceOutcome, VirtError> {
        let current = match self.client.lookup(params.name()).await {
            Lookup::Found(instance) => Some(instance),
            Lookup::NotFound => None,
            Lookup::Failed { status, text } => {
                return Err(VirtError::LookupFailed { status, text });
            }
        };

        let options = PlanOptions {
            autostart: params.spec.autostart(),
            wait_for_ipv4: params.wait_for_ipv4,
        };
        let plan = plan(params.name(), params.state, current.as_ref(), options)?;
        let mut outcome = InstanceOutcome {
            changed: plan.changed(),
            instance: None,
            planned_actions: plan.action_names(),
            warnings: Vec::new(),
            ipv4: None,
        };

        if mode == RunMode::Check {
            info!(actions = ?outcome.planned_actions, "check mode; plan not applied");
            outcome.instance = current;
            return Ok(outcome);
        }

        let mut target = current;
        let mut deleted = false;
        for action in &plan.actions {
            match action {
                Action::Create => target = self.client.create(&params.spec).await?,
                Action::Start => self.client.start(id_of(params, target.as_ref())?).await?,
                Action::Stop => self.client.stop(id_of(params, target.as_ref())?).await?,
                Action::Restart => self.client.restart(id_of(params, target.as_ref())?).await?,
                Action::Delete => {
                    self.client.delete(id_of(params, target.as_ref())?).await?;
                    deleted = true;
                }
                Action::AwaitStatus(status) => {
                    if !self
                        .client
                        .await_status(params.name(), status, params.timeout)
                        .await
                    {
                        record_timeout(params, &status.to_string(), &mut outcome)?;
                    }
                }
                Action::AwaitIpv4 => {
                    match self.client.await_ipv4(params.name(), params.timeout).await {
                        Some(address) => outcome.ipv4 = Some(address),
                        None => record_timeout(params, "an IPv4 address", &mut outcome)?,
                    }
                }
            }
        }

        outcome.instance = if deleted {
            None
        } else if outcome.changed {
            self.client.find_by_name(params.name()).await.or(target)
        } else {
            target
        };
        Ok(outcome)
    }
}

fn id_of<'a>(params: &InstanceParams, target: Option<&'a Instance>) -> Result<&'a str, VirtError> {
    target
        .map(|instance| instance.id.as_str())
        .ok_or_else(|| VirtError::InstanceNotFound {
            name: params.name().to_owned(),
        })
}

fn record_timeout(
    params: &InstanceParams,
    target: &str,
    outcome: &mut InstanceOutcome,
) -> Result<(), VirtError> {
    let err = VirtError::PollTimeout {
        name: params.name().to_owned(),
        target: target.to_owned(),
        timeout_secs: params.timeout.as_secs(),
    };
    match params.on_timeout {
        PollTimeoutPolicy::Ignore => Ok(()),
        PollTimeoutPolicy::Warn => {
            warn!(error = %err, "continuing after poll timeout");
            outcome.warnings.push(err.to_string());
            Ok(())
        }
        PollTimeoutPolicy::Fail => Err(err),
    }
}
