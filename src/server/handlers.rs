use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use super::SharedState;
use crate::error::{RelayError, RelayResult};
use crate::pointer::{MaskedPointer, UpstreamPointer};
use crate::storage::UpdateOutcome;

/// Length of a session code.
pub const SESSION_CODE_LEN: usize = 6;

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = json!({ "status": "error", "message": self.public_message() });
        (status, Json(body)).into_response()
    }
}

/// Body of push-cell and update requests.
#[derive(Debug, Deserialize)]
pub struct CellWriteBody {
    pub cell_id: Option<Value>,
    pub cell_content: Option<Value>,
    pub cell_timestamp: Option<Value>,
}

/// Body of delete requests.
#[derive(Debug, Deserialize)]
pub struct CellDeleteBody {
    pub cell_id: Option<Value>,
    pub cell_timestamp: Option<Value>,
}

/// Query of get-cell requests.
#[derive(Debug, Deserialize)]
pub struct GetCellQuery {
    pub cell_id: Option<String>,
    pub cell_timestamp: Option<String>,
}

/// Body of cleanup-orphans requests.
#[derive(Debug, Deserialize)]
pub struct CleanupBody {
    pub valid_cell_ids: Option<Value>,
}

/// Body of pointer updates.
#[derive(Debug, Deserialize)]
pub struct PointerBody {
    pub upstream_address: Option<String>,
    pub credential: Option<String>,
}

/// Session codes are exactly six ASCII letters or digits.
pub fn validate_session_code(session_id: &str) -> RelayResult<()> {
    if session_id.len() == SESSION_CODE_LEN && session_id.chars().all(|c| c.is_ascii_alphanumeric())
    {
        Ok(())
    } else {
        Err(RelayError::invalid(format!(
            "Session code must be {} letters or digits",
            SESSION_CODE_LEN
        )))
    }
}

/// Read a scalar JSON field as text. Numbers and booleans are accepted as
/// their JSON rendering.
fn required_field(name: &str, value: Option<Value>) -> RelayResult<String> {
    match value {
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(Value::Null) | None => Err(RelayError::invalid(format!("Missing {}", name))),
        Some(_) => Err(RelayError::invalid(format!("{} must be a scalar value", name))),
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> RelayResult<T> {
    payload.map(|Json(body)| body).map_err(|e| {
        debug!(error = %e.body_text(), "Rejected request body");
        RelayError::invalid("Invalid JSON body")
    })
}

/// POST /code_stream/{session}/push-cell/
pub async fn push_cell(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    payload: Result<Json<CellWriteBody>, JsonRejection>,
) -> RelayResult<Json<Value>> {
    validate_session_code(&session_id)?;
    let body = json_body(payload)?;
    let cell_id = required_field("cell_id", body.cell_id)?;
    let content = required_field("cell_content", body.cell_content)?;
    let timestamp = required_field("cell_timestamp", body.cell_timestamp)?;

    state
        .store
        .add(&session_id, &cell_id, &content, &timestamp)
        .await?;

    info!(session_id = %session_id, cell_id = %cell_id, "Cell pushed");
    Ok(Json(json!({
        "status": "success",
        "message": "Cell content pushed to channel."
    })))
}

/// GET /code_stream/{session}/get-cell/?cell_id=&cell_timestamp=
pub async fn get_cell(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    query: Result<Query<GetCellQuery>, QueryRejection>,
) -> RelayResult<Json<Value>> {
    validate_session_code(&session_id)?;
    let Query(query) = query.map_err(|e| {
        debug!(error = %e.body_text(), "Rejected query string");
        RelayError::invalid("Invalid query parameters")
    })?;

    let (Some(cell_id), Some(timestamp)) = (query.cell_id, query.cell_timestamp) else {
        return Err(RelayError::invalid(
            "Missing cell_id or cell_timestamp parameter",
        ));
    };

    let body = state
        .router
        .get_cell(state.principal(), &session_id, &cell_id, &timestamp)
        .await?;
    Ok(Json(body))
}

/// POST /code_stream/{session}/update/
pub async fn update_cell(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    payload: Result<Json<CellWriteBody>, JsonRejection>,
) -> RelayResult<Json<Value>> {
    validate_session_code(&session_id)?;
    let body = json_body(payload)?;
    let cell_id = required_field("cell_id", body.cell_id)?;
    let content = required_field("cell_content", body.cell_content)?;
    let timestamp = required_field("cell_timestamp", body.cell_timestamp)?;

    let outcome = state
        .store
        .update(&session_id, &cell_id, &content, &timestamp)
        .await?;

    let message = match outcome {
        UpdateOutcome::Updated => "Cell content updated in channel.",
        UpdateOutcome::Migrated => "Cell content updated and migrated to the current key format.",
        UpdateOutcome::Inserted => "Cell did not exist; content pushed to channel.",
    };
    info!(session_id = %session_id, cell_id = %cell_id, outcome = ?outcome, "Cell updated");
    Ok(Json(json!({ "status": "success", "message": message })))
}

/// POST /code_stream/{session}/delete/
pub async fn delete_cell(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    payload: Result<Json<CellDeleteBody>, JsonRejection>,
) -> RelayResult<Json<Value>> {
    validate_session_code(&session_id)?;
    let body = json_body(payload)?;
    let cell_id = required_field("cell_id", body.cell_id)?;
    let timestamp = required_field("cell_timestamp", body.cell_timestamp)?;

    if !state.store.delete(&session_id, &cell_id, &timestamp).await? {
        return Err(RelayError::not_found("Cell not found for deletion"));
    }

    info!(session_id = %session_id, cell_id = %cell_id, "Cell deleted");
    Ok(Json(json!({
        "status": "success",
        "message": "Cell content deleted from channel."
    })))
}

/// GET /code_stream/get-all-cell-ids/
pub async fn list_all_cell_ids(State(state): State<SharedState>) -> RelayResult<Json<Value>> {
    let body = state.router.list_cell_ids(state.principal(), None).await?;
    Ok(Json(body))
}

/// GET /code_stream/{session}/get-all-cell-ids/
pub async fn list_session_cell_ids(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> RelayResult<Json<Value>> {
    validate_session_code(&session_id)?;
    let body = state
        .router
        .list_cell_ids(state.principal(), Some(&session_id))
        .await?;
    Ok(Json(body))
}

/// POST /code_stream/{session}/cleanup-orphans/
pub async fn cleanup_orphans(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    payload: Result<Json<CleanupBody>, JsonRejection>,
) -> RelayResult<Json<Value>> {
    validate_session_code(&session_id)?;
    let body = json_body(payload)?;

    let valid_ids: HashSet<String> = match body.valid_cell_ids {
        None | Some(Value::Null) => HashSet::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| required_field("valid_cell_ids item", Some(item)))
            .collect::<RelayResult<_>>()?,
        Some(_) => return Err(RelayError::invalid("valid_cell_ids must be a list")),
    };

    let deleted = state.store.reclaim_orphans(&session_id, &valid_ids).await?;

    Ok(Json(json!({
        "status": "success",
        "message": format!("Orphan cells cleaned up. {} cells deleted.", deleted),
        "deleted_count": deleted
    })))
}

/// POST /code_stream/clear-all/
pub async fn clear_all(State(state): State<SharedState>) -> RelayResult<Json<Value>> {
    let deleted = state.store.reset_all().await?;

    Ok(Json(json!({
        "status": "success",
        "message": format!("All cell data cleared. {} keys deleted.", deleted),
        "deleted_count": deleted
    })))
}

/// GET /code_stream/config/
pub async fn get_pointer(State(state): State<SharedState>) -> RelayResult<Json<Value>> {
    let masked = state
        .pointers
        .get(state.principal())
        .await?
        .map(|p| p.masked())
        .unwrap_or_default();

    Ok(Json(json!({ "status": "success", "data": masked })))
}

/// POST /code_stream/config/
pub async fn set_pointer(
    State(state): State<SharedState>,
    payload: Result<Json<PointerBody>, JsonRejection>,
) -> RelayResult<Json<Value>> {
    let body = json_body(payload)?;
    let address = body.upstream_address.unwrap_or_default();
    let pointer = UpstreamPointer::new(&address, body.credential)?;

    state.pointers.set(state.principal(), &pointer).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Upstream configuration saved.",
        "data": pointer.masked()
    })))
}

/// DELETE /code_stream/config/
pub async fn delete_pointer(State(state): State<SharedState>) -> RelayResult<Json<Value>> {
    state.pointers.delete(state.principal()).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Upstream configuration removed.",
        "data": MaskedPointer::default()
    })))
}

/// POST /code_stream/test-connection/
pub async fn test_connection(State(state): State<SharedState>) -> RelayResult<Json<Value>> {
    let address = state.router.test_connection(state.principal()).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Connected to upstream server.",
        "upstream_address": address
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_code_validation() {
        assert!(validate_session_code("AB12CD").is_ok());
        assert!(validate_session_code("abcdef").is_ok());
        assert!(validate_session_code("ABC12").is_err());
        assert!(validate_session_code("ABC1234").is_err());
        assert!(validate_session_code("AB-2CD").is_err());
        assert!(validate_session_code("ÄB12CD").is_err());
    }

    #[test]
    fn test_required_field_accepts_scalars() {
        assert_eq!(required_field("f", Some(json!("x"))).unwrap(), "x");
        assert_eq!(required_field("f", Some(json!(101))).unwrap(), "101");
        assert_eq!(required_field("f", Some(json!(""))).unwrap(), "");
    }

    #[test]
    fn test_required_field_rejects_missing_and_compound() {
        for value in [None, Some(Value::Null), Some(json!([1])), Some(json!({"a": 1}))] {
            let err = required_field("cell_id", value).unwrap_err();
            assert_eq!(err.status_code(), 400);
        }
    }

    #[test]
    fn test_error_response_status() {
        let response = RelayError::UpstreamAuthFailed.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
