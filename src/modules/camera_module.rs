//! ptz camera module
//! cameras sit behind a companion controller service, the engine validates the
//! external ranges and converts them to the normalized wire units

use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::common::error::{DeviceServerError, DriverError, ServerErrorCode};
use crate::common::setting::CameraSetting;
use crate::driver::http::camera_client;
use crate::entity::dto::device_report_dto::{DeviceDetailDto, DeviceSummaryDto};
use crate::entity::dto::device_state_dto::{CameraStateDto, StateDtoEnum};
use crate::entity::dto::health_event_dto::HealthEnum;
use crate::entity::po::device_po::CameraDevicePo;
use crate::module_controller::health_event_bus::HealthEventBus;
use crate::module_controller::monitor_thread::start_monitor_thread;
use crate::module_controller::state_store::{DeviceMetaInfo, DeviceStateStore};
use crate::module_controller::traits::{DeviceModule, DeviceProbe};
use crate::{debug, info};

const LOG_TAG: &str = "camera_module";
const MODULE_NAME: &str = "camera";

pub struct CameraModule {
    setting: CameraSetting,
    store: Arc<DeviceStateStore>,
    event_bus: Arc<HealthEventBus>,
    client: Client,
    cancel_token: CancellationToken,
    monitor_handle: Option<thread::JoinHandle<()>>,
    initialized: bool,
}

struct CameraProbe {
    devices: Vec<CameraDevicePo>,
    client: Client,
    store: Arc<DeviceStateStore>,
}

#[async_trait]
impl DeviceProbe for CameraProbe {
    async fn probe_device(&self, device_id: &str) -> Result<HealthEnum, DriverError> {
        let po = self
            .devices
            .iter()
            .find(|po| po.device_id == device_id)
            .ok_or_else(|| DriverError(format!("camera probe: no config for {}", device_id)))?;
        let status = camera_client::get_status(&self.client, &po.controller_host, po.controller_port).await?;
        apply_status_payload(&self.store, device_id, &status);
        Ok(HealthEnum::Healthy)
    }
}

/// fold the controller status payload into the cached ptz state
fn apply_status_payload(store: &DeviceStateStore, device_id: &str, status: &serde_json::Value) {
    let pan = status.get("pan").and_then(|v| v.as_f64());
    let tilt = status.get("tilt").and_then(|v| v.as_f64());
    let zoom = status.get("zoom").and_then(|v| v.as_f64());
    store.update_state(device_id, |state| {
        if let StateDtoEnum::Camera(camera) = state {
            if let Some(pan) = pan {
                camera.pan = pan_tilt_from_device(pan);
            }
            if let Some(tilt) = tilt {
                camera.tilt = pan_tilt_from_device(tilt);
            }
            if let Some(zoom) = zoom {
                camera.zoom = zoom_from_device(zoom);
            }
        }
    });
}

// external -100..=100 <-> device -1.0..1.0
pub fn pan_tilt_to_device(value: i64) -> f64 {
    value as f64 / 100.0
}

pub fn pan_tilt_from_device(norm: f64) -> i64 {
    (norm * 100.0).round() as i64
}

// external zoom factor 1.0..=5.0 <-> device 0.0..1.0
pub fn zoom_to_device(zoom: f64) -> f64 {
    (zoom - 1.0) / 4.0
}

pub fn zoom_from_device(norm: f64) -> f64 {
    1.0 + norm * 4.0
}

impl CameraModule {
    pub fn new(setting: CameraSetting, event_bus: Arc<HealthEventBus>) -> Self {
        CameraModule {
            setting,
            store: Arc::new(DeviceStateStore::new()),
            event_bus,
            client: Client::new(),
            cancel_token: CancellationToken::new(),
            monitor_handle: None,
            initialized: false,
        }
    }

    fn find_device(&self, device_id: &str) -> Result<&CameraDevicePo, DeviceServerError> {
        self.setting
            .devices
            .iter()
            .find(|po| po.device_id == device_id)
            .ok_or_else(|| DeviceServerError {
                code: ServerErrorCode::DeviceNotFound,
                msg: format!("unknown camera device id: {}", device_id),
            })
    }

    /// move the camera, pan/tilt -100..=100, zoom factor 1.0..=5.0
    pub async fn set_position(
        &self,
        device_id: &str,
        pan: i64,
        tilt: i64,
        zoom: f64,
    ) -> Result<(), DeviceServerError> {
        let po = self.find_device(device_id)?;
        if !(-100..=100).contains(&pan) || !(-100..=100).contains(&tilt) {
            return Err(DeviceServerError {
                code: ServerErrorCode::ValidationError,
                msg: format!("pan/tilt out of range -100..=100: pan={}, tilt={}", pan, tilt),
            });
        }
        if !(1.0..=5.0).contains(&zoom) {
            return Err(DeviceServerError {
                code: ServerErrorCode::ValidationError,
                msg: format!("zoom out of range 1.0..=5.0: {}", zoom),
            });
        }

        camera_client::set_position(
            &self.client,
            &po.controller_host,
            po.controller_port,
            pan_tilt_to_device(pan),
            pan_tilt_to_device(tilt),
            zoom_to_device(zoom),
        )
        .await
        .map_err(|e| {
            self.store.record_error(device_id, &e.to_string());
            DeviceServerError { code: ServerErrorCode::DeviceUnreachable, msg: e.to_string() }
        })?;

        self.store.update_state(device_id, |state| {
            if let StateDtoEnum::Camera(camera) = state {
                camera.pan = pan;
                camera.tilt = tilt;
                camera.zoom = zoom;
            }
        });
        Ok(())
    }
}

fn initial_state() -> StateDtoEnum {
    StateDtoEnum::Camera(CameraStateDto { pan: 0, tilt: 0, zoom: 1.0 })
}

#[async_trait]
impl DeviceModule for CameraModule {
    fn module_name(&self) -> &'static str {
        MODULE_NAME
    }

    async fn initialize(&mut self) -> Result<bool, DeviceServerError> {
        if !self.setting.enabled {
            info!(LOG_TAG, "camera module disabled by config");
            return Ok(false);
        }
        if self.initialized {
            return Ok(true);
        }

        for po in &self.setting.devices {
            self.store.insert_device(DeviceMetaInfo::new(&po.device_id, &po.name, &po.model, initial_state()));
        }

        let probe = Arc::new(CameraProbe {
            devices: self.setting.devices.clone(),
            client: self.client.clone(),
            store: self.store.clone(),
        });
        self.cancel_token = CancellationToken::new();
        self.monitor_handle = Some(start_monitor_thread(
            MODULE_NAME,
            self.setting.monitor_interval_secs,
            probe,
            self.store.clone(),
            self.event_bus.clone(),
            self.cancel_token.clone(),
        ));
        self.initialized = true;
        Ok(true)
    }

    fn get_devices(&self) -> Vec<DeviceSummaryDto> {
        self.store.summaries()
    }

    /// snapshot plus an opportunistic ptz refresh, bounded by the client timeout
    async fn get_device_status(&self, device_id: &str) -> Result<DeviceDetailDto, DeviceServerError> {
        if let Ok(po) = self.find_device(device_id) {
            match camera_client::get_status(&self.client, &po.controller_host, po.controller_port).await {
                Ok(status) => apply_status_payload(&self.store, device_id, &status),
                Err(e) => debug!(LOG_TAG, "status refresh for {} skipped, msg: {}", device_id, e),
            }
        }
        self.store.detail(device_id).ok_or_else(|| DeviceServerError {
            code: ServerErrorCode::DeviceNotFound,
            msg: format!("unknown camera device id: {}", device_id),
        })
    }

    fn shutdown(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.monitor_handle.take() {
            let _ = handle.join();
        }
        self.store.clear();
        self.initialized = false;
        info!(LOG_TAG, "camera module stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::logger::init_logger;

    #[test]
    fn test_unit_conversions() {
        assert_eq!(pan_tilt_to_device(-100), -1.0);
        assert_eq!(pan_tilt_to_device(50), 0.5);
        assert_eq!(pan_tilt_from_device(0.5), 50);
        assert_eq!(zoom_to_device(1.0), 0.0);
        assert_eq!(zoom_to_device(5.0), 1.0);
        assert_eq!(zoom_to_device(3.0), 0.5);
        assert_eq!(zoom_from_device(0.25), 2.0);
    }

    fn test_setting() -> CameraSetting {
        CameraSetting {
            enabled: true,
            monitor_interval_secs: 1,
            devices: vec![CameraDevicePo {
                device_id: "cam_1".to_string(),
                name: "front camera".to_string(),
                model: "ptz pro".to_string(),
                controller_host: "127.0.0.1".to_string(),
                controller_port: 9,
            }],
        }
    }

    #[test]
    fn test_position_validation() {
        let _ = init_logger();
        let mut module = CameraModule::new(test_setting(), Arc::new(HealthEventBus::new()));
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert!(rt.block_on(module.initialize()).unwrap());

        for (pan, tilt, zoom) in [(-101, 0, 2.0), (101, 0, 2.0), (0, -101, 2.0), (0, 0, 0.9), (0, 0, 5.1)] {
            let err = rt.block_on(module.set_position("cam_1", pan, tilt, zoom)).unwrap_err();
            assert_eq!(err.code, ServerErrorCode::ValidationError);
        }

        // valid ranges reach the wire and fail unreachable against the dead port
        let err = rt.block_on(module.set_position("cam_1", 0, 0, 2.0)).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::DeviceUnreachable);

        // cached state still the initial one
        let detail = rt.block_on(module.get_device_status("cam_1")).unwrap();
        match detail.state {
            StateDtoEnum::Camera(camera) => {
                assert_eq!(camera.pan, 0);
                assert_eq!(camera.zoom, 1.0);
            }
            other => panic!("unexpected state: {:?}", other),
        }
        module.shutdown();
    }
}
