//! AccessStore MySQL repository
//!
//! Schema: migrations/001_init.sql

use super::types::*;
use super::AccessStore;
use crate::error::{Error, Result};
use crate::event_log_service::{DetectionEvent, OwnerInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use uuid::Uuid;

/// MySQL-backed store
#[derive(Clone)]
pub struct MySqlAccessStore {
    pool: MySqlPool,
}

impl MySqlAccessStore {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    const PLATE_COLUMNS: &'static str = r#"
        plate_id, site_id, block_name, apartment_number, owner_name,
        CAST(plates AS CHAR) AS plates, valid_until, status
    "#;

    const CAMERA_COLUMNS: &'static str = r#"
        camera_id, name, origin_kind, origin, door_id, fps, enabled, position
    "#;

    const DETECTION_COLUMNS: &'static str = r#"
        detection_id, camera_id, plate, status, CAST(confidence AS DOUBLE) AS confidence,
        detected_at, image_base64, CAST(owner_info AS CHAR) AS owner_info
    "#;

    fn row_to_plate_record(row: MySqlRow) -> Result<PlateRecord> {
        let plates_json: String = row.try_get("plates")?;
        let plates: Vec<String> = serde_json::from_str(&plates_json)?;
        let status: String = row.try_get("status")?;

        Ok(PlateRecord {
            plate_id: row.try_get("plate_id")?,
            site_id: row.try_get("site_id")?,
            block_name: row.try_get("block_name")?,
            apartment_number: row.try_get("apartment_number")?,
            owner_name: row.try_get("owner_name")?,
            plates,
            valid_until: row.try_get("valid_until")?,
            status: AccessStatus::from_db(&status),
        })
    }

    fn row_to_camera(row: MySqlRow) -> Result<Camera> {
        let origin_kind: String = row.try_get("origin_kind")?;
        let fps: i32 = row.try_get("fps")?;

        Ok(Camera {
            camera_id: row.try_get("camera_id")?,
            name: row.try_get("name")?,
            origin_kind: origin_kind.parse()?,
            origin: row.try_get("origin")?,
            door_id: row.try_get("door_id")?,
            fps: fps.max(0) as u32,
            enabled: row.try_get("enabled")?,
            position: row.try_get("position")?,
        })
    }

    fn row_to_event(row: MySqlRow) -> Result<DetectionEvent> {
        let id: String = row.try_get("detection_id")?;
        let status: String = row.try_get("status")?;
        let confidence: f64 = row.try_get("confidence")?;
        let timestamp: DateTime<Utc> = row.try_get("detected_at")?;
        let owner_info: Option<OwnerInfo> = row
            .try_get::<Option<String>, _>("owner_info")?
            .map(|s| serde_json::from_str(&s))
            .transpose()?;

        Ok(DetectionEvent {
            id: Uuid::parse_str(&id)
                .map_err(|e| Error::Internal(format!("Invalid detection id {}: {}", id, e)))?,
            camera_id: row.try_get("camera_id")?,
            plate: row.try_get("plate")?,
            status: status.parse()?,
            confidence: confidence as f32,
            timestamp,
            image_base64: row.try_get("image_base64")?,
            owner_info,
        })
    }

    fn push_filter(builder: &mut QueryBuilder<'_, MySql>, filter: &DetectionFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(start) = filter.start {
            builder.push(" AND detected_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            builder.push(" AND detected_at <= ").push_bind(end);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(ref camera_id) = filter.camera_id {
            builder.push(" AND camera_id = ").push_bind(camera_id.clone());
        }
    }
}

#[async_trait]
impl AccessStore for MySqlAccessStore {
    async fn find_access_entry(&self, plate: &str) -> Result<Option<PlateRecord>> {
        let query = format!(
            "SELECT {} FROM plates WHERE JSON_CONTAINS(plates, JSON_QUOTE(?)) LIMIT 1",
            Self::PLATE_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(plate)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_plate_record).transpose()
    }

    async fn find_camera(&self, camera_id: &str) -> Result<Option<Camera>> {
        let query = format!(
            "SELECT {} FROM cameras WHERE camera_id = ?",
            Self::CAMERA_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(camera_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_camera).transpose()
    }

    async fn find_door(&self, door_id: &str) -> Result<Option<Door>> {
        let row = sqlx::query("SELECT door_id, name, ip, endpoint FROM doors WHERE door_id = ?")
            .bind(door_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Door {
                door_id: row.try_get("door_id")?,
                name: row.try_get("name")?,
                ip: row.try_get("ip")?,
                endpoint: row.try_get("endpoint")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_detection(&self, event: &DetectionEvent) -> Result<()> {
        let owner_info = event
            .owner_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO detections (
                detection_id, camera_id, plate, status, confidence,
                detected_at, image_base64, owner_info
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(&event.camera_id)
        .bind(&event.plate)
        .bind(event.status.as_str())
        .bind(event.confidence as f64)
        .bind(event.timestamp)
        .bind(&event.image_base64)
        .bind(owner_info)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            detection_id = %event.id,
            camera_id = %event.camera_id,
            plate = %event.plate,
            "Detection persisted"
        );

        Ok(())
    }

    async fn count_detections(&self, filter: &DetectionFilter) -> Result<u64> {
        let mut builder = QueryBuilder::<MySql>::new("SELECT COUNT(*) AS cnt FROM detections");
        Self::push_filter(&mut builder, filter);

        let row = builder.build().fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("cnt")?;
        Ok(count.max(0) as u64)
    }

    async fn list_detections(
        &self,
        filter: &DetectionFilter,
        limit: u32,
    ) -> Result<Vec<DetectionEvent>> {
        let mut builder = QueryBuilder::<MySql>::new(format!(
            "SELECT {} FROM detections",
            Self::DETECTION_COLUMNS
        ));
        Self::push_filter(&mut builder, filter);
        builder.push(" ORDER BY detected_at DESC LIMIT ").push_bind(limit);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }
}
