//! Fakes and fixtures shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use image::GrayImage;
use plate_gate::access_store::{AccessStatus, Camera, Door, MemoryAccessStore, OriginKind, PlateRecord};
use plate_gate::ai_client::{DetectorLoader, PlateBox, PlateDetector, TextRecognizer};
use plate_gate::decision_stage::DecisionStage;
use plate_gate::door_actuator::DoorTrigger;
use plate_gate::error::{Error, Result};
use plate_gate::event_log_service::EventLogService;
use plate_gate::frame_source::{Capture, CaptureBackend, Frame};
use plate_gate::plate_reader::{PlateReader, ReaderConfig};
use plate_gate::realtime_hub::RealtimeHub;
use plate_gate::result_sink::ResultSink;
use plate_gate::stream_supervisor::{StreamSupervisor, SupervisorConfig};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ALLOWED_PLATE: &str = "34ABC123";
pub const BLOCKED_PLATE: &str = "35DEF456";

/// Capture backend that is either unreachable or hands out blank live
/// captures, tracking how many are held open at once
#[derive(Default)]
pub struct FakeBackend {
    pub reachable: bool,
    pub opens: AtomicUsize,
    pub open_now: Arc<AtomicUsize>,
    pub max_open: AtomicUsize,
}

#[async_trait]
impl CaptureBackend for FakeBackend {
    async fn open(&self, camera: &Camera) -> Result<Box<dyn Capture>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(Error::Capture(format!("{} unreachable", camera.origin)));
        }
        let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(FakeCapture {
            open_now: self.open_now.clone(),
            released: false,
        }))
    }
}

pub struct FakeCapture {
    open_now: Arc<AtomicUsize>,
    released: bool,
}

#[async_trait]
impl Capture for FakeCapture {
    async fn read_frame(&mut self) -> Result<Frame> {
        if self.released {
            return Err(Error::Capture("released".to_string()));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(Frame::new(640, 480))
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        // Device handles take a while to let go, like an exiting child process
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.released = true;
        self.open_now.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Detector returning the same regions for every frame
pub struct FixedDetector {
    pub boxes: Vec<PlateBox>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl PlateDetector for FixedDetector {
    async fn detect(&self, _frame: &Frame, _min_confidence: f32) -> Result<Vec<PlateBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.boxes.clone())
    }
}

pub struct FixedLoader {
    pub detector: Arc<FixedDetector>,
}

#[async_trait]
impl DetectorLoader for FixedLoader {
    async fn load(&self) -> Result<Arc<dyn PlateDetector>> {
        Ok(self.detector.clone())
    }
}

/// OCR that always "reads" the same text
pub struct ScriptedOcr {
    pub text: String,
}

#[async_trait]
impl TextRecognizer for ScriptedOcr {
    async fn extract_text(&self, _image: &GrayImage, _whitelist: &str) -> Result<String> {
        Ok(self.text.clone())
    }
}

#[derive(Default)]
pub struct CountingTrigger {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl CountingTrigger {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DoorTrigger for CountingTrigger {
    async fn trigger(&self, door: &Door, _timeout: Duration) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Actuator(format!("Door {} unreachable", door.door_id)));
        }
        Ok(())
    }
}

pub fn plate_box() -> PlateBox {
    PlateBox {
        x1: 100.0,
        y1: 200.0,
        x2: 300.0,
        y2: 250.0,
        confidence: 0.9,
    }
}

pub fn camera(camera_id: &str) -> Camera {
    Camera {
        camera_id: camera_id.to_string(),
        name: format!("Gate {}", camera_id),
        origin_kind: OriginKind::NetworkStream,
        origin: format!("rtsp://10.0.0.9/{}", camera_id),
        door_id: Some("d1".to_string()),
        fps: 30,
        enabled: true,
        position: 0,
    }
}

/// Store with two cameras, one door and an allowed and a blocked record
pub async fn seeded_store() -> Arc<MemoryAccessStore> {
    let store = Arc::new(MemoryAccessStore::new());
    store.upsert_camera(camera("cam-1")).await;
    store.upsert_camera(camera("cam-2")).await;
    store
        .upsert_door(Door {
            door_id: "d1".to_string(),
            name: "Main gate".to_string(),
            ip: "10.0.0.5".to_string(),
            endpoint: "/open".to_string(),
        })
        .await;
    store
        .upsert_record(record("p1", ALLOWED_PLATE, AccessStatus::Allowed))
        .await
        .unwrap();
    store
        .upsert_record(record("p2", BLOCKED_PLATE, AccessStatus::Blocked))
        .await
        .unwrap();
    store
}

fn record(plate_id: &str, plate: &str, status: AccessStatus) -> PlateRecord {
    PlateRecord {
        plate_id: plate_id.to_string(),
        site_id: "s1".to_string(),
        block_name: "A Blok".to_string(),
        apartment_number: "12".to_string(),
        owner_name: "Ayse Demir".to_string(),
        plates: vec![plate.to_string()],
        valid_until: "2030-01-01".to_string(),
        status,
    }
}

/// Fully wired pipeline over fakes
pub struct Pipeline {
    pub store: Arc<MemoryAccessStore>,
    pub backend: Arc<FakeBackend>,
    pub detector: Arc<FixedDetector>,
    pub trigger: Arc<CountingTrigger>,
    pub event_log: Arc<EventLogService>,
    pub hub: Arc<RealtimeHub>,
    pub supervisor: Arc<StreamSupervisor>,
}

pub struct PipelineOptions {
    pub ocr_text: String,
    pub boxes: Vec<PlateBox>,
    pub cooldown: Duration,
    pub trigger: CountingTrigger,
    pub reachable_origin: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            ocr_text: ALLOWED_PLATE.to_string(),
            boxes: vec![plate_box()],
            // Long enough that only the first read of a test is accepted
            cooldown: Duration::from_secs(60),
            trigger: CountingTrigger::default(),
            reachable_origin: false,
        }
    }
}

pub async fn pipeline(options: PipelineOptions) -> Pipeline {
    let store = seeded_store().await;
    let backend = Arc::new(FakeBackend {
        reachable: options.reachable_origin,
        ..Default::default()
    });
    let detector = Arc::new(FixedDetector {
        boxes: options.boxes,
        calls: AtomicUsize::new(0),
    });
    let trigger = Arc::new(options.trigger);

    let reader = PlateReader::new(
        Arc::new(FixedLoader {
            detector: detector.clone(),
        }),
        Arc::new(ScriptedOcr {
            text: options.ocr_text,
        }),
        ReaderConfig {
            cooldown: options.cooldown,
            ..Default::default()
        },
    )
    .spawn();

    let decision = Arc::new(DecisionStage::new(store.clone(), trigger.clone()));
    let event_log = Arc::new(EventLogService::default());
    let hub = Arc::new(RealtimeHub::new());
    let sink = Arc::new(ResultSink::new(store.clone(), event_log.clone(), hub.clone()));

    let supervisor = Arc::new(StreamSupervisor::new(
        store.clone(),
        backend.clone(),
        reader,
        decision,
        sink,
        SupervisorConfig {
            stop_timeout: Duration::from_secs(2),
            ..Default::default()
        },
    ));

    Pipeline {
        store,
        backend,
        detector,
        trigger,
        event_log,
        hub,
        supervisor,
    }
}

/// Poll `check` until it holds; panics after fifteen seconds
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while !check().await {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
