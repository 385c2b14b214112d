//! In-memory stand-in for the appliance instance API.
//!
//! Instances live in a shared table; lifecycle calls update it the way the
//! appliance would, and exec calls consult a set of paths that exist inside
//! every instance.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use truevirt::transport::{ApiRequest, ApiResponse, Method, Transport, TransportFuture};

const INSTANCE_PATH: &str = "/virt/instance";

#[derive(Debug, Default)]
struct State {
    instances: Vec<Value>,
    next_id: u32,
    listing_fails: bool,
    files: BTreeSet<String>,
    exec_stdout: String,
    exec_rc: i32,
    executed: Vec<Vec<String>>,
    mutations: Vec<String>,
}

/// Shared fake backend; clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.state().next_id = 123;
        backend
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_instance(&self, name: &str, status: &str) {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        state
            .instances
            .push(json!({"id": id.to_string(), "name": name, "status": status, "type": "CONTAINER"}));
    }

    pub fn fail_listing(&self) {
        self.state().listing_fails = true;
    }

    pub fn add_file(&self, path: &str) {
        self.state().files.insert(path.to_owned());
    }

    pub fn script_exec(&self, stdout: &str, rc: i32) {
        let mut state = self.state();
        state.exec_stdout = stdout.to_owned();
        state.exec_rc = rc;
    }

    /// Status of the named instance, if it exists.
    pub fn status_of(&self, name: &str) -> Option<String> {
        self.state()
            .instances
            .iter()
            .find(|instance| instance["name"] == name)
            .and_then(|instance| instance["status"].as_str().map(str::to_owned))
    }

    /// `"METHOD path"` for every call other than listing and path probes.
    pub fn mutations(&self) -> Vec<String> {
        self.state().mutations.clone()
    }

    /// Commands run through exec, excluding path probes.
    pub fn executed(&self) -> Vec<Vec<String>> {
        self.state().executed.clone()
    }

    fn respond(&self, request: &ApiRequest) -> ApiResponse {
        let mut state = self.state();
        let Some(rest) = request.path.strip_prefix(INSTANCE_PATH) else {
            return text(404, "not found");
        };
        let segments: Vec<&str> = rest.split('/').filter(|part| !part.is_empty()).collect();

        match (request.method, segments.as_slice()) {
            (Method::Get, []) if state.listing_fails => text(500, "Internal Server Error"),
            (Method::Get, []) => reply(200, &Value::Array(state.instances.clone())),
            (Method::Post, []) => {
                state.mutations.push(format!("POST {}", request.path));
                let Some(body) = request.body.as_ref() else {
                    return text(400, "missing body");
                };
                let id = state.next_id.to_string();
                state.next_id += 1;
                let record = json!({
                    "id": id,
                    "name": body["name"],
                    "status": "Stopped",
                    "type": body["type"],
                });
                state.instances.push(record.clone());
                reply(201, &record)
            }
            (Method::Post, [_, "exec"]) => exec(&mut state, request),
            (Method::Post, [id, action]) => {
                state.mutations.push(format!("POST {}", request.path));
                let target = match *action {
                    "start" | "restart" => "Running",
                    "stop" => "Stopped",
                    _ => return text(404, "unknown action"),
                };
                match find(&mut state.instances, id) {
                    Some(instance) => {
                        instance["status"] = json!(target);
                        text(200, "")
                    }
                    None => text(404, "no such instance"),
                }
            }
            (Method::Delete, [id]) => {
                state.mutations.push(format!("DELETE {}", request.path));
                state.instances.retain(|instance| instance["id"] != *id);
                text(204, "")
            }
            _ => text(405, "method not allowed"),
        }
    }
}

impl Transport for FakeBackend {
    fn call<'a>(&'a self, request: &'a ApiRequest) -> TransportFuture<'a> {
        let response = self.respond(request);
        Box::pin(async move { response })
    }
}

fn exec(state: &mut State, request: &ApiRequest) -> ApiResponse {
    let argv: Vec<String> = request
        .body
        .as_ref()
        .and_then(|body| body["command"].as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default();

    if let Some(path) = argv.get(2).and_then(|script| script.strip_prefix("test -e ")) {
        let rc = i32::from(!state.files.contains(path.trim_matches('\'')));
        return reply(200, &json!({"stdout": "", "stderr": "", "return": rc}));
    }

    state.mutations.push(format!("POST {}", request.path));
    state.executed.push(argv);
    reply(
        200,
        &json!({"stdout": state.exec_stdout, "stderr": "", "return": state.exec_rc}),
    )
}

fn find<'a>(instances: &'a mut [Value], id: &str) -> Option<&'a mut Value> {
    instances.iter_mut().find(|instance| instance["id"] == id)
}

fn reply(status: u16, body: &Value) -> ApiResponse {
    ApiResponse::from_server(status, body.to_string())
}

fn text(status: u16, body: &str) -> ApiResponse {
    ApiResponse::from_server(status, body.to_owned())
}
