//! led wall module
//! every wall has redundant controller ips, health needs all of them, control
//! writes succeed on the first ip that accepts the command

use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::common::error::{DeviceServerError, DriverError, ServerErrorCode};
use crate::common::setting::DisplaySetting;
use crate::driver::http::display_client;
use crate::entity::dto::device_report_dto::{DeviceDetailDto, DeviceSummaryDto};
use crate::entity::dto::device_state_dto::{DisplayStateDto, StateDtoEnum};
use crate::entity::dto::health_event_dto::HealthEnum;
use crate::entity::po::device_po::DisplayDevicePo;
use crate::module_controller::health_event_bus::HealthEventBus;
use crate::module_controller::monitor_thread::start_monitor_thread;
use crate::module_controller::state_store::{DeviceMetaInfo, DeviceStateStore};
use crate::module_controller::traits::{DeviceModule, DeviceProbe};
use crate::info;

const LOG_TAG: &str = "display_module";
const MODULE_NAME: &str = "display";

pub struct DisplayModule {
    setting: DisplaySetting,
    store: Arc<DeviceStateStore>,
    event_bus: Arc<HealthEventBus>,
    client: Client,
    cancel_token: CancellationToken,
    monitor_handle: Option<thread::JoinHandle<()>>,
    initialized: bool,
}

/// health wants every redundant ip, one silent controller degrades the wall
struct DisplayProbe {
    devices: Vec<DisplayDevicePo>,
    client: Client,
    store: Arc<DeviceStateStore>,
}

#[async_trait]
impl DeviceProbe for DisplayProbe {
    async fn probe_device(&self, device_id: &str) -> Result<HealthEnum, DriverError> {
        let po = self
            .devices
            .iter()
            .find(|po| po.device_id == device_id)
            .ok_or_else(|| DriverError(format!("display probe: no config for {}", device_id)))?;

        let mut responding: Vec<String> = Vec::new();
        for ip in &po.ips {
            if display_client::probe(&self.client, ip, po.port).await {
                responding.push(ip.clone());
            }
        }
        self.store.update_state(device_id, |state| {
            if let StateDtoEnum::Display(display) = state {
                display.responding_ips = responding.clone();
            }
        });

        let health = aggregate_display_health(po.ips.len(), responding.len());
        if health == HealthEnum::Offline {
            return Err(DriverError(format!(
                "no controller ip responding ({} configured)",
                po.ips.len()
            )));
        }
        Ok(health)
    }
}

/// all ips -> healthy, some -> unhealthy, none -> offline
pub fn aggregate_display_health(configured: usize, responding: usize) -> HealthEnum {
    if configured == 0 || responding == 0 {
        HealthEnum::Offline
    } else if responding < configured {
        HealthEnum::Unhealthy
    } else {
        HealthEnum::Healthy
    }
}

/// external 0..=100 brightness to the device side scalar
pub fn to_device_scalar(brightness: i64) -> f64 {
    brightness as f64 / 100.0
}

impl DisplayModule {
    pub fn new(setting: DisplaySetting, event_bus: Arc<HealthEventBus>) -> Self {
        DisplayModule {
            setting,
            store: Arc::new(DeviceStateStore::new()),
            event_bus,
            client: Client::new(),
            cancel_token: CancellationToken::new(),
            monitor_handle: None,
            initialized: false,
        }
    }

    fn find_device(&self, device_id: &str) -> Result<&DisplayDevicePo, DeviceServerError> {
        self.setting
            .devices
            .iter()
            .find(|po| po.device_id == device_id)
            .ok_or_else(|| DeviceServerError {
                code: ServerErrorCode::DeviceNotFound,
                msg: format!("unknown display device id: {}", device_id),
            })
    }

    /// set wall brightness, 0..=100
    /// tries every configured ip in order and succeeds on the first accept
    pub async fn set_brightness(&self, device_id: &str, brightness: i64) -> Result<(), DeviceServerError> {
        let po = self.find_device(device_id)?;
        if !(0..=100).contains(&brightness) {
            return Err(DeviceServerError {
                code: ServerErrorCode::ValidationError,
                msg: format!("brightness out of range 0..=100: {}", brightness),
            });
        }
        let scalar = to_device_scalar(brightness);
        let mut last_err: Option<DriverError> = None;
        for ip in &po.ips {
            match display_client::set_brightness(&self.client, ip, po.port, scalar).await {
                Ok(()) => {
                    self.store.update_state(device_id, |state| {
                        if let StateDtoEnum::Display(display) = state {
                            display.brightness = brightness as u8;
                        }
                    });
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        let msg = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no controller ip configured".to_string());
        self.store.record_error(device_id, &msg);
        Err(DeviceServerError { code: ServerErrorCode::DeviceUnreachable, msg })
    }

    /// switch the wall on or off, first accepting ip wins
    pub async fn set_enabled(&self, device_id: &str, on: bool) -> Result<(), DeviceServerError> {
        let po = self.find_device(device_id)?;
        let mut last_err: Option<DriverError> = None;
        for ip in &po.ips {
            match display_client::set_power(&self.client, ip, po.port, on).await {
                Ok(()) => {
                    self.store.update_state(device_id, |state| {
                        if let StateDtoEnum::Display(display) = state {
                            display.on = on;
                        }
                    });
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        let msg = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no controller ip configured".to_string());
        self.store.record_error(device_id, &msg);
        Err(DeviceServerError { code: ServerErrorCode::DeviceUnreachable, msg })
    }
}

fn initial_state() -> StateDtoEnum {
    StateDtoEnum::Display(DisplayStateDto { brightness: 100, on: false, responding_ips: Vec::new() })
}

#[async_trait]
impl DeviceModule for DisplayModule {
    fn module_name(&self) -> &'static str {
        MODULE_NAME
    }

    async fn initialize(&mut self) -> Result<bool, DeviceServerError> {
        if !self.setting.enabled {
            info!(LOG_TAG, "display module disabled by config");
            return Ok(false);
        }
        if self.initialized {
            return Ok(true);
        }

        for po in &self.setting.devices {
            self.store.insert_device(DeviceMetaInfo::new(&po.device_id, &po.name, &po.model, initial_state()));
        }

        let probe = Arc::new(DisplayProbe {
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

    async fn get_device_status(&self, device_id: &str) -> Result<DeviceDetailDto, DeviceServerError> {
        self.store.detail(device_id).ok_or_else(|| DeviceServerError {
            code: ServerErrorCode::DeviceNotFound,
            msg: format!("unknown display device id: {}", device_id),
        })
    }

    fn shutdown(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.monitor_handle.take() {
            let _ = handle.join();
        }
        self.store.clear();
        self.initialized = false;
        info!(LOG_TAG, "display module stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::logger::init_logger;

    #[test]
    fn test_health_aggregation() {
        assert_eq!(aggregate_display_health(2, 2), HealthEnum::Healthy);
        assert_eq!(aggregate_display_health(2, 1), HealthEnum::Unhealthy);
        assert_eq!(aggregate_display_health(2, 0), HealthEnum::Offline);
        assert_eq!(aggregate_display_health(1, 1), HealthEnum::Healthy);
        assert_eq!(aggregate_display_health(0, 0), HealthEnum::Offline);
    }

    #[test]
    fn test_brightness_scalar_conversion() {
        assert_eq!(to_device_scalar(0), 0.0);
        assert_eq!(to_device_scalar(75), 0.75);
        assert_eq!(to_device_scalar(100), 1.0);
    }

    fn test_setting() -> DisplaySetting {
        DisplaySetting {
            enabled: true,
            monitor_interval_secs: 1,
            devices: vec![DisplayDevicePo {
                device_id: "wall_1".to_string(),
                name: "main wall".to_string(),
                model: "ledwall 2x2".to_string(),
                ips: vec!["127.0.0.1".to_string()],
                // nothing listens here, control calls must fail typed
                port: 9,
            }],
        }
    }

    #[test]
    fn test_brightness_validation_and_unreachable() {
        let _ = init_logger();
        let mut module = DisplayModule::new(test_setting(), Arc::new(HealthEventBus::new()));
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert!(rt.block_on(module.initialize()).unwrap());

        let err = rt.block_on(module.set_brightness("wall_1", 150)).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::ValidationError);
        let err = rt.block_on(module.set_brightness("wall_1", -5)).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::ValidationError);

        // state kept its default after the rejected writes
        let detail = rt.block_on(module.get_device_status("wall_1")).unwrap();
        match detail.state {
            StateDtoEnum::Display(display) => assert_eq!(display.brightness, 100),
            other => panic!("unexpected state: {:?}", other),
        }

        let err = rt.block_on(module.set_brightness("wall_1", 40)).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::DeviceUnreachable);

        let err = rt.block_on(module.set_brightness("ghost", 40)).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::DeviceNotFound);
        module.shutdown();
    }
}
