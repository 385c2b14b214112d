//! Pure planning: desired state plus observed instance to ordered actions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::VirtError;
use crate::instance::{Instance, InstanceStatus};

/// State requested by the caller.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    /// The instance exists, whatever its status.
    #[default]
    Present,
    /// The instance does not exist.
    Absent,
    /// The instance exists and is running.
    Started,
    /// The instance exists and is stopped.
    Stopped,
    /// The instance is restarted on every run.
    Restarted,
}

impl DesiredState {
    /// Lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Restarted => "restarted",
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a plan.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    /// Create the instance from the spec.
    Create,
    /// Start the instance.
    Start,
    /// Stop the instance.
    Stop,
    /// Restart the instance.
    Restart,
    /// Stop, then delete the instance.
    Delete,
    /// Poll until the instance reports the status.
    AwaitStatus(InstanceStatus),
    /// Poll until the instance reports an IPv4 address.
    AwaitIpv4,
}

impl Action {
    /// Whether the action changes backend state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::Start | Self::Stop | Self::Restart | Self::Delete
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
            Self::Restart => f.write_str("restart"),
            Self::Delete => f.write_str("delete"),
            Self::AwaitStatus(status) => write!(f, "wait:{status}"),
            Self::AwaitIpv4 => f.write_str("wait:ipv4"),
        }
    }
}

/// Planning inputs besides the desired state and observation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PlanOptions {
    /// Start the instance right after creating it.
    pub autostart: bool,
    /// Wait for an IPv4 address after starting.
    pub wait_for_ipv4: bool,
}

/// Ordered actions and whether they change anything.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Plan {
    /// Actions in execution order.
    pub actions: Vec<Action>,
}

impl Plan {
    /// `true` when at least one action mutates the backend.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.actions.iter().any(Action::is_mutation)
    }

    /// Action names, for reporting.
    #[must_use]
    pub fn action_names(&self) -> Vec<String> {
        self.actions.iter().map(ToString::to_string).collect()
    }

    fn started_by(mut actions: Vec<Action>, options: PlanOptions) -> Self {
        if options.wait_for_ipv4 {
            actions.push(Action::AwaitIpv4);
        }
        Self { actions }
    }
}

/// Computes the plan moving `current` to `desired`.
///
/// # Errors
///
/// Returns [`VirtError::InstanceNotFound`] when `started`, `stopped` or
/// `restarted` is requested for a missing instance.
pub fn plan(
    name: &str,
    desired: DesiredState,
    current: Option<&Instance>,
    options: PlanOptions,
) -> Result<Plan, VirtError> {
    let not_found = || VirtError::InstanceNotFound {
        name: name.to_owned(),
    };

    let plan = match (desired, current) {
        (DesiredState::Present, None) if options.autostart => {
            Plan::started_by(vec![Action::Create, Action::Start], options)
        }
        (DesiredState::Present, None) => Plan {
            actions: vec![Action::Create],
        },
        (DesiredState::Present, Some(_)) | (DesiredState::Absent, None) => Plan::default(),
        (DesiredState::Absent, Some(_)) => Plan {
            actions: vec![Action::Delete],
        },
        (DesiredState::Started | DesiredState::Stopped | DesiredState::Restarted, None) => {
            return Err(not_found());
        }
        (DesiredState::Started, Some(instance)) if instance.status == InstanceStatus::Running => {
            Plan::default()
        }
        (DesiredState::Started, Some(_)) => Plan::started_by(
            vec![Action::Start, Action::AwaitStatus(InstanceStatus::Running)],
            options,
        ),
        (DesiredState::Stopped, Some(instance)) if instance.status == InstanceStatus::Stopped => {
            Plan::default()
        }
        (DesiredState::Stopped, Some(_)) => Plan {
            actions: vec![Action::Stop, Action::AwaitStatus(InstanceStatus::Stopped)],
        },
        (DesiredState::Restarted, Some(_)) => Plan::started_by(
            vec![Action::Restart, Action::AwaitStatus(InstanceStatus::Running)],
            options,
        ),
    };
    Ok(plan)
}
