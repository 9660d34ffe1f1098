//! API Routes

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::access_store::DetectionFilter;
use crate::door_actuator::MANUAL_TRIGGER_TIMEOUT;
use crate::error::{Error, Result};
use crate::event_log_service::{DetectionEvent, PlateStatus};
use crate::models::{
    end_of_day, start_of_day, ApiResponse, CameraStartResponse, CameraStopResponse,
    DetectionQuery, DetectionStats, DoorOpenResponse, RecentQuery,
};
use crate::state::AppState;
use crate::stream_supervisor::{ActivateOutcome, StopOutcome, StreamSupervisor, WorkerSnapshot};

/// Upper bound for one detection list page
pub const MAX_DETECTION_PAGE: u32 = 1000;

/// Interval between MJPEG parts
const MJPEG_INTERVAL: Duration = Duration::from_millis(100);
const MJPEG_BOUNDARY: &str = "frame";

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/system/status", get(super::system_status))
        // Cameras
        .route("/api/cameras/active", get(list_active_cameras))
        .route("/api/cameras/:id/start", post(start_camera))
        .route("/api/cameras/:id/stop", post(stop_camera))
        .route("/api/cameras/:id/frame", get(get_camera_frame))
        .route("/api/cameras/:id/stream", get(stream_camera))
        // Detections
        .route("/api/detections", get(list_detections))
        .route("/api/detections/recent", get(recent_detections))
        .route("/api/detections/stats", get(detection_stats))
        // Doors
        .route("/api/doors/:id/open", post(open_door))
        // WebSocket
        .route("/api/ws/detections", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Camera Handlers
// ========================================

async fn list_active_cameras(State(state): State<AppState>) -> Json<ApiResponse<Vec<WorkerSnapshot>>> {
    Json(ApiResponse::success(state.supervisor.list_active().await))
}

async fn start_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<CameraStartResponse>>> {
    let (message, snapshot) = match state.supervisor.activate(&id).await? {
        ActivateOutcome::Started(s) => ("started", s),
        ActivateOutcome::AlreadyRunning(s) => ("already running", s),
    };

    Ok(Json(ApiResponse::success(CameraStartResponse {
        camera_id: snapshot.camera_id,
        message: message.to_string(),
        simulated: snapshot.simulated,
    })))
}

async fn stop_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ApiResponse<CameraStopResponse>> {
    let stopped = state.supervisor.deactivate(&id).await == StopOutcome::Stopped;
    Json(ApiResponse::success(CameraStopResponse {
        camera_id: id,
        stopped,
    }))
}

async fn get_camera_frame(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    match state.supervisor.latest_frame(&id).await {
        None => Err(Error::NotFound(format!("Camera {} is not active", id))),
        Some(None) => Ok(StatusCode::NO_CONTENT.into_response()),
        Some(Some(jpeg)) => Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response()),
    }
}

/// One multipart section carrying a JPEG
pub(crate) fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let head = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", MJPEG_BOUNDARY);
    let mut part = Vec::with_capacity(head.len() + jpeg.len() + 2);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// MJPEG stream of the camera's latest frame; ends when the camera stops
async fn stream_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    if !state.supervisor.is_active(&id).await {
        return Err(Error::NotFound(format!("Camera {} is not active", id)));
    }

    let parts = futures::stream::unfold(
        (state.supervisor.clone(), id, true),
        |(supervisor, camera_id, first): (Arc<StreamSupervisor>, String, bool)| async move {
            if !first {
                tokio::time::sleep(MJPEG_INTERVAL).await;
            }
            loop {
                match supervisor.latest_frame(&camera_id).await? {
                    Some(jpeg) => {
                        let part = mjpeg_part(&jpeg);
                        return Some((Ok::<_, Infallible>(part), (supervisor, camera_id, false)));
                    }
                    None => tokio::time::sleep(MJPEG_INTERVAL).await,
                }
            }
        },
    );

    let content_type = format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY);
    Ok(([(header::CONTENT_TYPE, content_type)], Body::from_stream(parts)).into_response())
}

// ========================================
// Detection Handlers
// ========================================

async fn list_detections(
    State(state): State<AppState>,
    Query(query): Query<DetectionQuery>,
) -> Result<Json<ApiResponse<Vec<DetectionEvent>>>> {
    let filter = DetectionFilter {
        start: query
            .start_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc()),
        end: query.end_date.and_then(end_of_day),
        status: query.status,
        camera_id: query.camera_id,
    };
    let limit = query
        .limit
        .unwrap_or(MAX_DETECTION_PAGE)
        .clamp(1, MAX_DETECTION_PAGE);

    let detections = state.store.list_detections(&filter, limit).await?;
    Ok(Json(ApiResponse::success(detections)))
}

async fn recent_detections(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Json<ApiResponse<Vec<DetectionEvent>>> {
    let events = match query.camera_id {
        Some(camera_id) => state.event_log.get_by_camera(&camera_id).await,
        None => state.event_log.get_all().await,
    };
    Json(ApiResponse::success(events))
}

async fn detection_stats(State(state): State<AppState>) -> Result<Json<ApiResponse<DetectionStats>>> {
    let today = DetectionFilter::since(start_of_day(Utc::now()));
    let store = &state.store;

    let stats = DetectionStats {
        total_today: store.count_detections(&today).await?,
        allowed_today: store
            .count_detections(&today.clone().with_status(PlateStatus::Allowed))
            .await?,
        blocked_today: store
            .count_detections(&today.clone().with_status(PlateStatus::Blocked))
            .await?,
        unknown_today: store
            .count_detections(&today.with_status(PlateStatus::Unknown))
            .await?,
    };

    Ok(Json(ApiResponse::success(stats)))
}

// ========================================
// Door Handlers
// ========================================

async fn open_door(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DoorOpenResponse>> {
    let door = state
        .store
        .find_door(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Door {}", id)))?;

    state.door_trigger.trigger(&door, MANUAL_TRIGGER_TIMEOUT).await?;
    tracing::info!(door_id = %id, "Door opened manually");

    Ok(Json(DoorOpenResponse {
        success: true,
        message: "Door opened".to_string(),
    }))
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut rx) = state.realtime.register().await;

    // Forward hub messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Client text only keeps the connection alive
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Ping(data)) => {
                    tracing::trace!("Received ping: {:?}", data);
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %conn_id, "WebSocket close frame");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        conn_id
    });

    let conn_id = tokio::select! {
        _ = send_task => conn_id,
        result = recv_task => result.unwrap_or(conn_id),
    };

    state.realtime.unregister(&conn_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mjpeg_part_layout() {
        let part = mjpeg_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let mut expected = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        expected.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xD9]);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(part.as_ref(), expected.as_slice());
    }
}
