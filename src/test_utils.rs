// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-memory stand-in for the Kubernetes API server.
//!
//! Objects are stored as JSON keyed by their full API path. Creates stamp a
//! uid and a resource version; updates and patches carrying a stale
//! resource version are rejected with 409, like the real API server.

use http::{Method, Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// Collection names the fake server knows how to list and create into
const COLLECTIONS: &[&str] = &[
    "serviceaccounts",
    "services",
    "secrets",
    "roles",
    "rolebindings",
    "clusterroles",
    "clusterrolebindings",
    "daemonsets",
    "mutatingwebhookconfigurations",
    "certificatesigningrequests",
    "ekspodidentitywebhooks",
];

/// Subresources whose writes only touch `.status`
const STATUS_SUBRESOURCES: &[&str] = &["status", "approval"];

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Value>,
    requests: Vec<(Method, String)>,
    failures: HashMap<(Method, String), u16>,
    revision: u64,
}

impl State {
    fn next_revision(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

/// A stateful mock HTTP service implementing enough of the API server for the installer.
#[derive(Clone, Default)]
pub struct FakeApiServer {
    state: Arc<Mutex<State>>,
}

impl FakeApiServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object at `path`, stamping a uid and resource version when absent
    pub fn insert(&self, path: &str, mut object: Value) {
        let mut state = self.state.lock().unwrap();
        let revision = state.next_revision();
        let metadata = &mut object["metadata"];
        if metadata.get("uid").is_none() {
            metadata["uid"] = json!(format!("uid-{}", revision));
        }
        metadata["resourceVersion"] = json!(revision);
        state.objects.insert(path.to_string(), object);
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.state.lock().unwrap().objects.get(path).cloned()
    }

    pub fn remove(&self, path: &str) -> Option<Value> {
        self.state.lock().unwrap().objects.remove(path)
    }

    /// Answer every `method` request to `path` with an error of the given code
    pub fn fail(&self, method: Method, path: &str, code: u16) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((method, path.to_string()), code);
    }

    /// All requests seen so far
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests that were not reads
    pub fn mutations(&self) -> Vec<(Method, String)> {
        self.requests()
            .into_iter()
            .filter(|(method, _)| *method != Method::GET)
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }

    /// Build a kube Client backed by this server
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn handle(&self, method: Method, path: String, body: Option<Value>) -> (u16, Value) {
        let mut state = self.state.lock().unwrap();
        state.requests.push((method.clone(), path.clone()));

        if let Some(code) = state.failures.get(&(method.clone(), path.clone())) {
            return (*code, status_json(*code, "InternalError", "injected failure"));
        }

        let (object_path, subresource) = split_subresource(&path);

        match method.as_str() {
            "GET" => get(&state, &path),
            "POST" => match body {
                Some(object) => create(&mut state, &path, object),
                None => bad_request(),
            },
            "PUT" => match body {
                Some(object) => replace(&mut state, object_path, subresource, object),
                None => bad_request(),
            },
            "PATCH" => match body {
                Some(patch) => patch_object(&mut state, object_path, subresource, patch),
                None => bad_request(),
            },
            "DELETE" => match state.objects.remove(&path) {
                Some(object) => (200, object),
                None => not_found(&path),
            },
            _ => (405, status_json(405, "MethodNotAllowed", "method not allowed")),
        }
    }
}

fn is_collection(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .is_some_and(|last| COLLECTIONS.contains(&last))
}

fn split_subresource(path: &str) -> (&str, Option<&str>) {
    match path.rsplit_once('/') {
        Some((parent, last)) if STATUS_SUBRESOURCES.contains(&last) => (parent, Some(last)),
        _ => (path, None),
    }
}

fn status_json(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
}

fn not_found(path: &str) -> (u16, Value) {
    (404, status_json(404, "NotFound", &format!("{} not found", path)))
}

fn bad_request() -> (u16, Value) {
    (400, status_json(400, "BadRequest", "missing request body"))
}

fn conflict(path: &str) -> (u16, Value) {
    (
        409,
        status_json(
            409,
            "Conflict",
            &format!("Operation cannot be fulfilled on {}: the object has been modified", path),
        ),
    )
}

fn get(state: &State, path: &str) -> (u16, Value) {
    if let Some(object) = state.objects.get(path) {
        return (200, object.clone());
    }
    if !is_collection(path) {
        return not_found(path);
    }

    let prefix = format!("{}/", path);
    let items: Vec<Value> = state
        .objects
        .iter()
        .filter(|(key, _)| {
            key.strip_prefix(&prefix)
                .is_some_and(|name| !name.contains('/'))
        })
        .map(|(_, object)| object.clone())
        .collect();

    (
        200,
        json!({
            "apiVersion": "v1",
            "kind": "List",
            "metadata": { "resourceVersion": state.revision.to_string() },
            "items": items
        }),
    )
}

fn create(state: &mut State, collection: &str, mut object: Value) -> (u16, Value) {
    let Some(name) = object["metadata"]["name"].as_str().map(str::to_string) else {
        return (400, status_json(400, "BadRequest", "metadata.name is required"));
    };
    let path = format!("{}/{}", collection, name);
    if state.objects.contains_key(&path) {
        return (
            409,
            status_json(409, "AlreadyExists", &format!("{} already exists", path)),
        );
    }

    let revision = state.next_revision();
    object["metadata"]["uid"] = json!(format!("uid-{}", revision));
    object["metadata"]["resourceVersion"] = json!(revision);
    state.objects.insert(path, object.clone());
    (201, object)
}

fn stale(stored: &Value, incoming: &Value) -> bool {
    match incoming["metadata"]["resourceVersion"].as_str() {
        Some(version) => stored["metadata"]["resourceVersion"].as_str() != Some(version),
        None => false,
    }
}

fn replace(state: &mut State, path: &str, subresource: Option<&str>, object: Value) -> (u16, Value) {
    let Some(stored) = state.objects.get(path).cloned() else {
        return not_found(path);
    };
    if stale(&stored, &object) {
        return conflict(path);
    }

    let mut updated = match subresource {
        Some(_) => {
            let mut updated = stored;
            updated["status"] = object["status"].clone();
            updated
        }
        None => {
            let mut updated = object;
            updated["metadata"]["uid"] = stored["metadata"]["uid"].clone();
            updated
        }
    };
    updated["metadata"]["resourceVersion"] = json!(state.next_revision());
    state.objects.insert(path.to_string(), updated.clone());
    (200, updated)
}

fn patch_object(
    state: &mut State,
    path: &str,
    subresource: Option<&str>,
    patch: Value,
) -> (u16, Value) {
    let Some(mut stored) = state.objects.get(path).cloned() else {
        return not_found(path);
    };
    if stale(&stored, &patch) {
        return conflict(path);
    }

    match subresource {
        Some(_) => merge(&mut stored["status"], &patch["status"]),
        None => merge(&mut stored, &patch),
    }
    stored["metadata"]["resourceVersion"] = json!(state.next_revision());
    state.objects.insert(path.to_string(), stored.clone());
    (200, stored)
}

/// JSON merge patch (RFC 7386)
fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(patch_fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = json!({});
    }
    if let Value::Object(target_fields) = target {
        for (key, value) in patch_fields {
            if value.is_null() {
                target_fields.remove(key);
            } else {
                merge(target_fields.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

impl Service<Request<Body>> for FakeApiServer {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let server = self.clone();

        Box::pin(async move {
            let method = req.method().clone();
            let path = req.uri().path().to_string();
            let bytes = req.into_body().collect().await?.to_bytes();
            let body = if bytes.is_empty() {
                None
            } else {
                Some(serde_json::from_slice::<Value>(&bytes)?)
            };

            let (status, response) = server.handle(method, path, body);
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&response)?))?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_patch_semantics() {
        let mut target = json!({ "a": 1, "b": { "c": 2, "d": 3 } });

        merge(&mut target, &json!({ "b": { "c": null, "e": 4 }, "f": "x" }));

        assert_eq!(target, json!({ "a": 1, "b": { "d": 3, "e": 4 }, "f": "x" }));
    }

    #[test]
    fn test_collection_listing_excludes_nested_paths() {
        let server = FakeApiServer::new();
        server.insert("/api/v1/namespaces/a/secrets/one", json!({ "metadata": { "name": "one" } }));
        server.insert("/api/v1/namespaces/b/secrets/two", json!({ "metadata": { "name": "two" } }));

        let state = server.state.lock().unwrap();
        let (code, list) = get(&state, "/api/v1/namespaces/a/secrets");

        assert_eq!(code, 200);
        assert_eq!(list["items"].as_array().unwrap().len(), 1);
        assert_eq!(list["items"][0]["metadata"]["name"], "one");
    }

    #[test]
    fn test_stale_update_is_rejected() {
        let server = FakeApiServer::new();
        server.insert("/api/v1/namespaces/a/secrets/one", json!({ "metadata": { "name": "one" } }));

        let (code, _) = server.handle(
            Method::PUT,
            "/api/v1/namespaces/a/secrets/one".to_string(),
            Some(json!({ "metadata": { "name": "one", "resourceVersion": "0" } })),
        );

        assert_eq!(code, 409);
    }
}
