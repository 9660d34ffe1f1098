//! DoorActuator - HTTP door trigger
//!
//! A door opens on `GET http://{ip}{endpoint}`; the response body is
//! ignored and only success/failure matters.

use crate::access_store::Door;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Timeout for triggers issued by the pipeline
pub const AUTO_TRIGGER_TIMEOUT: Duration = Duration::from_secs(2);
/// Timeout for manual opens from the API
pub const MANUAL_TRIGGER_TIMEOUT: Duration = Duration::from_secs(3);

#[async_trait]
pub trait DoorTrigger: Send + Sync {
    async fn trigger(&self, door: &Door, timeout: Duration) -> Result<()>;
}

/// reqwest based trigger
#[derive(Clone, Default)]
pub struct HttpDoorTrigger {
    client: reqwest::Client,
}

impl HttpDoorTrigger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DoorTrigger for HttpDoorTrigger {
    async fn trigger(&self, door: &Door, timeout: Duration) -> Result<()> {
        let url = door.trigger_url();
        let resp = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::Actuator(format!("Door {} unreachable: {}", door.door_id, e)))?;

        if !resp.status().is_success() {
            return Err(Error::Actuator(format!(
                "Door {} returned {}",
                door.door_id,
                resp.status()
            )));
        }

        tracing::info!(door_id = %door.door_id, url = %url, "Door triggered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_door_is_actuator_error() {
        let door = Door {
            door_id: "d1".to_string(),
            name: "Gate".to_string(),
            ip: "127.0.0.1:1".to_string(),
            endpoint: "/open".to_string(),
        };
        let result = HttpDoorTrigger::new()
            .trigger(&door, Duration::from_millis(500))
            .await;
        assert!(matches!(result, Err(Error::Actuator(_))));
    }
}
