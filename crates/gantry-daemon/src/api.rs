//! REST API handlers

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use gantry_core::{ErrorBody, LookupError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::master::Master;

/// Successful command invocation
#[derive(Debug, Serialize)]
pub struct CommandResult {
    pub result: Value,
}

/// Lookup failures are reported in the body with a 200 status
pub(crate) fn lookup_failed(err: LookupError) -> Response {
    debug!(error = %err, "Lookup failed");
    Json(err.body()).into_response()
}

fn reply<T: Serialize>(result: Result<T, LookupError>) -> Response {
    match result {
        Ok(data) => Json(data).into_response(),
        Err(e) => lookup_failed(e),
    }
}

/// List all registered robots
pub async fn list_robots(State(master): State<Arc<Master>>) -> impl IntoResponse {
    Json(master.data())
}

pub async fn get_robot(
    State(master): State<Arc<Master>>,
    Path(robot): Path<String>,
) -> Response {
    reply(master.lookup_robot(&robot).map(|r| r.data()))
}

pub async fn robot_commands(
    State(master): State<Arc<Master>>,
    Path(robot): Path<String>,
) -> Response {
    reply(master.lookup_robot(&robot).map(|r| r.commands()))
}

pub async fn robot_command(
    State(master): State<Arc<Master>>,
    Path((robot, command)): Path<(String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = parse_command_params(&method, query.as_deref(), content_type(&headers), &body);
    match master.lookup_robot(&robot) {
        Ok(robot) => invoke(command.clone(), move || robot.command(&command, &params)).await,
        Err(e) => lookup_failed(e),
    }
}

pub async fn list_devices(
    State(master): State<Arc<Master>>,
    Path(robot): Path<String>,
) -> Response {
    reply(master.lookup_robot(&robot).map(|r| r.data().devices))
}

pub async fn get_device(
    State(master): State<Arc<Master>>,
    Path((robot, device)): Path<(String, String)>,
) -> Response {
    reply(master.lookup_robot_device(&robot, &device).map(|d| d.data()))
}

pub async fn device_commands(
    State(master): State<Arc<Master>>,
    Path((robot, device)): Path<(String, String)>,
) -> Response {
    reply(
        master
            .lookup_robot_device(&robot, &device)
            .map(|d| d.commands().to_vec()),
    )
}

pub async fn device_command(
    State(master): State<Arc<Master>>,
    Path((robot, device, command)): Path<(String, String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = parse_command_params(&method, query.as_deref(), content_type(&headers), &body);
    match master.lookup_robot_device(&robot, &device) {
        Ok(device) => invoke(command.clone(), move || device.command(&command, &params)).await,
        Err(e) => lookup_failed(e),
    }
}

pub async fn list_connections(
    State(master): State<Arc<Master>>,
    Path(robot): Path<String>,
) -> Response {
    reply(master.lookup_robot(&robot).map(|r| r.data().connections))
}

pub async fn get_connection(
    State(master): State<Arc<Master>>,
    Path((robot, connection)): Path<(String, String)>,
) -> Response {
    reply(
        master
            .lookup_robot_connection(&robot, &connection)
            .map(|c| c.data()),
    )
}

pub async fn connection_command(
    State(master): State<Arc<Master>>,
    Path((robot, connection, command)): Path<(String, String, String)>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = parse_command_params(&method, query.as_deref(), content_type(&headers), &body);
    match master.lookup_robot_connection(&robot, &connection) {
        Ok(connection) => {
            invoke(command.clone(), move || connection.command(&command, &params)).await
        }
        Err(e) => lookup_failed(e),
    }
}

pub async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new(format!("No route for {}", uri.path()))),
    )
        .into_response()
}

/// Run a provider command on the blocking pool, turning errors and provider
/// panics into error bodies
async fn invoke<F>(command: String, call: F) -> Response
where
    F: FnOnce() -> gantry_core::Result<Value> + Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(Ok(result)) => Json(CommandResult { result }).into_response(),
        Ok(Err(e)) => {
            warn!(command = %command, error = %e, "Command failed");
            Json(ErrorBody::new(e.to_string())).into_response()
        }
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(command = %command, reason = %reason, "Command panicked");
            Json(ErrorBody::new(format!("Command '{}' panicked: {}", command, reason))).into_response()
        }
        Err(e) => {
            error!(command = %command, error = %e, "Command task failed");
            Json(ErrorBody::new(format!("Command '{}' did not complete", command))).into_response()
        }
    }
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

/// Extract positional command arguments from a request.
///
/// Query parameters are used when the method is GET or any are present;
/// otherwise the body is read as a JSON object or a urlencoded form. Values
/// keep the order their keys appear in. Query and form values stay strings.
pub fn parse_command_params(
    method: &Method,
    query: Option<&str>,
    content_type: Option<&str>,
    body: &[u8],
) -> Vec<Value> {
    let query = query.map(parse_pairs).unwrap_or_default();
    if method == Method::GET || !query.is_empty() {
        return query.into_iter().map(|(_, v)| Value::String(v)).collect();
    }

    if body.is_empty() {
        return Vec::new();
    }

    let is_form = content_type
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if is_form {
        return match std::str::from_utf8(body) {
            Ok(form) => parse_pairs(form).into_iter().map(|(_, v)| Value::String(v)).collect(),
            Err(_) => Vec::new(),
        };
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map.into_iter().map(|(_, v)| v).collect(),
        Ok(Value::Array(items)) => items,
        Ok(_) => Vec::new(),
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable command body");
            Vec::new()
        }
    }
}

fn parse_pairs(encoded: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str(encoded).unwrap_or_default()
}
