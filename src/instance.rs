//! Instance records exchanged with the `/virt/instance` endpoints.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Kind of virtualization workload.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceType {
    /// System container.
    #[default]
    Container,
    /// Virtual machine.
    Vm,
}

/// Status reported by the backend. Unknown values are preserved verbatim.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceStatus {
    /// Instance is running.
    Running,
    /// Instance is stopped.
    Stopped,
    /// Instance is booting.
    Starting,
    /// Instance is shutting down.
    Stopping,
    /// Backend reports an error state.
    Error,
    /// Status missing or reported as unknown.
    #[default]
    Unknown,
    /// Unrecognised status text.
    Other(String),
}

impl InstanceStatus {
    /// Wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Stopping => "Stopping",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl From<String> for InstanceStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Running" => Self::Running,
            "Stopped" => Self::Stopped,
            "Starting" => Self::Starting,
            "Stopping" => Self::Stopping,
            "Error" => Self::Error,
            "Unknown" | "" => Self::Unknown,
            _ => Self::Other(value),
        }
    }
}

impl From<InstanceStatus> for String {
    fn from(value: InstanceStatus) -> Self {
        match value {
            InstanceStatus::Other(text) => text,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network address reported for an instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct InstanceAlias {
    /// Address family, `INET` or `INET6`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Address text.
    pub address: String,
    /// Prefix length, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<u8>,
}

/// Instance record as returned by the backend.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Instance {
    /// Backend identifier used in action paths.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Instance name; the lookup key.
    pub name: String,
    /// Current status.
    #[serde(default)]
    pub status: InstanceStatus,
    /// Workload kind.
    #[serde(rename = "type", default)]
    pub instance_type: InstanceType,
    /// Raw configuration map.
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: Map<String, Value>,
    /// Raw device map.
    #[serde(default, deserialize_with = "null_as_default")]
    pub devices: Map<String, Value>,
    /// Network addresses.
    #[serde(default, deserialize_with = "null_as_default")]
    pub aliases: Vec<InstanceAlias>,
    /// Remaining backend fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Instance {
    /// First IPv4 address among the instance aliases.
    #[must_use]
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.aliases
            .iter()
            .filter(|alias| alias.kind.eq_ignore_ascii_case("INET"))
            .find_map(|alias| alias.address.parse().ok())
    }
}

/// Payload for creating an instance. Optional fields are omitted when unset.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InstanceSpec {
    /// Instance name.
    pub name: String,
    /// Workload kind.
    #[serde(rename = "type")]
    pub instance_type: InstanceType,
    /// Image source description, passed through unvalidated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    /// Configuration keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    /// Devices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<Map<String, Value>>,
}

impl InstanceSpec {
    /// Starts a spec for `name` with the default type.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// `true` when `boot.autostart` is the string `"true"`.
    #[must_use]
    pub fn autostart(&self) -> bool {
        self.config
            .as_ref()
            .and_then(|config| config.get("boot.autostart"))
            .and_then(Value::as_str)
            == Some("true")
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_backend_record() {
        let instance: Instance = serde_json::from_value(json!({
            "id": 7,
            "name": "matchbox",
            "status": "Running",
            "type": "VM",
            "aliases": [
                {"type": "INET6", "address": "fd42::1", "netmask": 64},
                {"type": "INET", "address": "10.0.0.5", "netmask": 24}
            ],
            "autostart": true
        }))
        .unwrap_or_else(|err| panic!("record should decode: {err}"));

        assert_eq!(instance.id, "7");
        assert_eq!(instance.status, InstanceStatus::Running);
        assert_eq!(instance.instance_type, InstanceType::Vm);
        assert_eq!(instance.ipv4(), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(instance.extra.get("autostart"), Some(&json!(true)));
    }

    #[test]
    fn null_aliases_and_unknown_status_are_tolerated() {
        let instance: Instance = serde_json::from_value(json!({
            "id": "a",
            "name": "a",
            "status": "Frozen",
            "aliases": null
        }))
        .unwrap_or_else(|err| panic!("record should decode: {err}"));

        assert_eq!(instance.status, InstanceStatus::Other(String::from("Frozen")));
        assert!(instance.aliases.is_empty());
        assert_eq!(instance.ipv4(), None);
    }

    #[test]
    fn spec_omits_unset_fields() {
        let spec = InstanceSpec::new("matchbox");
        assert_eq!(
            serde_json::to_value(&spec).ok(),
            Some(json!({"name": "matchbox", "type": "CONTAINER"}))
        );
    }

    #[test]
    fn autostart_requires_the_string_true() {
        let mut spec = InstanceSpec::new("a");
        let mut config = Map::new();
        config.insert(String::from("boot.autostart"), json!(true));
        spec.config = Some(config.clone());
        assert!(!spec.autostart());

        config.insert(String::from("boot.autostart"), json!("true"));
        spec.config = Some(config);
        assert!(spec.autostart());
    }
}
