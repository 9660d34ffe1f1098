//! AccessStore - record storage seen from the pipeline
//!
//! ## Responsibilities
//!
//! - Plate record lookup by plate string
//! - Camera and door lookup
//! - Detection persistence and counting
//!
//! CRUD of these records belongs to the management side; the pipeline only
//! reads cameras/doors/plates and appends detections.

mod memory;
mod repository;
mod types;

pub use memory::{MemoryAccessStore, StoreSeed};
pub use repository::MySqlAccessStore;
pub use types::*;

use crate::error::Result;
use crate::event_log_service::DetectionEvent;
use async_trait::async_trait;

/// Storage collaborator used by the decision stage, result sink and API
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Plate record whose registered plates contain `plate`
    async fn find_access_entry(&self, plate: &str) -> Result<Option<PlateRecord>>;

    async fn find_camera(&self, camera_id: &str) -> Result<Option<Camera>>;

    async fn find_door(&self, door_id: &str) -> Result<Option<Door>>;

    async fn insert_detection(&self, event: &DetectionEvent) -> Result<()>;

    async fn count_detections(&self, filter: &DetectionFilter) -> Result<u64>;

    /// Newest first
    async fn list_detections(
        &self,
        filter: &DetectionFilter,
        limit: u32,
    ) -> Result<Vec<DetectionEvent>>;
}
