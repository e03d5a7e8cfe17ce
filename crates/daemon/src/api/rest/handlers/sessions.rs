//! Session lifecycle handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use bdtp_engine::{OpenRequest, SessionStatus};
use bdtp_types::{ChainAddress, FlowType, SessionId, SessionState, SubjectId};
use serde::{Deserialize, Serialize};

/// Open session request
#[derive(Debug, Deserialize)]
pub struct OpenSessionRequest {
    pub flow_type: FlowType,
    pub subject_ids: Vec<String>,
    pub initiator: String,
    pub buyer_public_key: Option<String>,
}

/// Open session response
#[derive(Debug, Serialize)]
pub struct OpenSessionResponse {
    pub session_id: SessionId,
    pub state: SessionState,
}

/// Open a workflow session
pub async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<OpenSessionRequest>,
) -> ApiResult<Json<OpenSessionResponse>> {
    let initiator = ChainAddress::parse(&request.initiator)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let subject_ids = request.subject_ids.into_iter().map(SubjectId::new).collect();

    let (session_id, session_state) = state
        .orchestrator
        .open_session(OpenRequest {
            flow_type: request.flow_type,
            subject_ids,
            initiator,
            buyer_public_key: request.buyer_public_key,
        })
        .await?;

    Ok(Json(OpenSessionResponse {
        session_id,
        state: session_state,
    }))
}

/// Get session status
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionStatus>> {
    let session_id = parse_session_id(&id)?;
    let status = state.orchestrator.get_session_status(session_id).await?;
    Ok(Json(status))
}

/// Cancel session response
#[derive(Debug, Serialize)]
pub struct CancelSessionResponse {
    pub session_id: SessionId,
    pub state: SessionState,
}

/// Cancel a session
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CancelSessionResponse>> {
    let session_id = parse_session_id(&id)?;
    let session_state = state.orchestrator.cancel_session(session_id).await?;

    tracing::info!(session_id = %session_id, "session cancelled");

    Ok(Json(CancelSessionResponse {
        session_id,
        state: session_state,
    }))
}

fn parse_session_id(id: &str) -> ApiResult<SessionId> {
    SessionId::parse(id).map_err(|e| ApiError::BadRequest(e.to_string()))
}
