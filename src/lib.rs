//! Plate Gate Library
//!
//! Camera stream processing and license-plate access control.
//!
//! ## Architecture
//!
//! 1. FrameSource - Frames from a device or network stream, simulated fallback
//! 2. PlateReader - Throttled detection, OCR and plate normalization
//! 3. DecisionStage - Access lookup, door trigger, annotated snapshot
//! 4. StreamSupervisor - One worker per active camera
//! 5. ResultSink - Persistence, recent history and broadcast
//! 6. AccessStore - Cameras, doors, plate records, detections
//! 7. RealtimeHub - WebSocket distribution
//! 8. WebAPI - REST API endpoints
//!
//! Detector and OCR engines sit behind the traits in `ai_client`; capture
//! backends behind the traits in `frame_source`.

pub mod access_store;
pub mod ai_client;
pub mod decision_stage;
pub mod door_actuator;
pub mod event_log_service;
pub mod frame_source;
pub mod plate_reader;
pub mod realtime_hub;
pub mod result_sink;
pub mod stream_supervisor;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
