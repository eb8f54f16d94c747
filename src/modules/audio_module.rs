//! network audio module
//! microphones and speakers on the room network, same lifecycle as every
//! other category, probed and controlled over their http api

use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::common::error::{DeviceServerError, DriverError, ServerErrorCode};
use crate::common::setting::AudioSetting;
use crate::driver::http::audio_client;
use crate::entity::dto::device_report_dto::{DeviceDetailDto, DeviceSummaryDto};
use crate::entity::dto::device_state_dto::{AudioStateDto, StateDtoEnum};
use crate::entity::dto::health_event_dto::HealthEnum;
use crate::entity::po::device_po::AudioDevicePo;
use crate::module_controller::health_event_bus::HealthEventBus;
use crate::module_controller::monitor_thread::start_monitor_thread;
use crate::module_controller::state_store::{DeviceMetaInfo, DeviceStateStore};
use crate::module_controller::traits::{DeviceModule, DeviceProbe};
use crate::info;

const LOG_TAG: &str = "audio_module";
const MODULE_NAME: &str = "audio";

pub struct AudioModule {
    setting: AudioSetting,
    store: Arc<DeviceStateStore>,
    event_bus: Arc<HealthEventBus>,
    client: Client,
    cancel_token: CancellationToken,
    monitor_handle: Option<thread::JoinHandle<()>>,
    initialized: bool,
}

struct AudioProbe {
    devices: Vec<AudioDevicePo>,
    client: Client,
}

#[async_trait]
impl DeviceProbe for AudioProbe {
    async fn probe_device(&self, device_id: &str) -> Result<HealthEnum, DriverError> {
        let po = self
            .devices
            .iter()
            .find(|po| po.device_id == device_id)
            .ok_or_else(|| DriverError(format!("audio probe: no config for {}", device_id)))?;
        if audio_client::probe(&self.client, &po.host, po.port).await {
            Ok(HealthEnum::Healthy)
        } else {
            Err(DriverError(format!("audio device {}:{} not responding", po.host, po.port)))
        }
    }
}

impl AudioModule {
    pub fn new(setting: AudioSetting, event_bus: Arc<HealthEventBus>) -> Self {
        AudioModule {
            setting,
            store: Arc::new(DeviceStateStore::new()),
            event_bus,
            client: Client::new(),
            cancel_token: CancellationToken::new(),
            monitor_handle: None,
            initialized: false,
        }
    }

    fn find_device(&self, device_id: &str) -> Result<&AudioDevicePo, DeviceServerError> {
        self.setting
            .devices
            .iter()
            .find(|po| po.device_id == device_id)
            .ok_or_else(|| DeviceServerError {
                code: ServerErrorCode::DeviceNotFound,
                msg: format!("unknown audio device id: {}", device_id),
            })
    }

    /// set device volume, 0..=100
    pub async fn set_volume(&self, device_id: &str, volume: i64) -> Result<(), DeviceServerError> {
        let po = self.find_device(device_id)?;
        if !(0..=100).contains(&volume) {
            return Err(DeviceServerError {
                code: ServerErrorCode::ValidationError,
                msg: format!("volume out of range 0..=100: {}", volume),
            });
        }
        audio_client::set_volume(&self.client, &po.host, po.port, volume)
            .await
            .map_err(|e| {
                self.store.record_error(device_id, &e.to_string());
                DeviceServerError { code: ServerErrorCode::DeviceUnreachable, msg: e.to_string() }
            })?;
        self.store.update_state(device_id, |state| {
            if let StateDtoEnum::Audio(audio) = state {
                audio.volume = volume;
            }
        });
        Ok(())
    }

    pub async fn set_muted(&self, device_id: &str, muted: bool) -> Result<(), DeviceServerError> {
        let po = self.find_device(device_id)?;
        audio_client::set_muted(&self.client, &po.host, po.port, muted)
            .await
            .map_err(|e| {
                self.store.record_error(device_id, &e.to_string());
                DeviceServerError { code: ServerErrorCode::DeviceUnreachable, msg: e.to_string() }
            })?;
        self.store.update_state(device_id, |state| {
            if let StateDtoEnum::Audio(audio) = state {
                audio.muted = muted;
            }
        });
        Ok(())
    }
}

fn initial_state() -> StateDtoEnum {
    StateDtoEnum::Audio(AudioStateDto { volume: 50, muted: false })
}

#[async_trait]
impl DeviceModule for AudioModule {
    fn module_name(&self) -> &'static str {
        MODULE_NAME
    }

    async fn initialize(&mut self) -> Result<bool, DeviceServerError> {
        if !self.setting.enabled {
            info!(LOG_TAG, "audio module disabled by config");
            return Ok(false);
        }
        if self.initialized {
            return Ok(true);
        }

        for po in &self.setting.devices {
            self.store.insert_device(DeviceMetaInfo::new(&po.device_id, &po.name, &po.model, initial_state()));
        }

        let probe = Arc::new(AudioProbe { devices: self.setting.devices.clone(), client: self.client.clone() });
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
            msg: format!("unknown audio device id: {}", device_id),
        })
    }

    fn shutdown(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.monitor_handle.take() {
            let _ = handle.join();
        }
        self.store.clear();
        self.initialized = false;
        info!(LOG_TAG, "audio module stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::logger::init_logger;
    use crate::entity::po::device_po::AudioDeviceKindEnum;

    fn test_setting() -> AudioSetting {
        AudioSetting {
            enabled: true,
            monitor_interval_secs: 2,
            devices: vec![AudioDevicePo {
                device_id: "mic_1".to_string(),
                name: "table mic".to_string(),
                model: "netmic 2".to_string(),
                host: "127.0.0.1".to_string(),
                port: 9,
                kind: AudioDeviceKindEnum::Microphone,
            }],
        }
    }

    #[test]
    fn test_volume_validation_and_unreachable() {
        let _ = init_logger();
        let mut module = AudioModule::new(test_setting(), Arc::new(HealthEventBus::new()));
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert!(rt.block_on(module.initialize()).unwrap());

        let err = rt.block_on(module.set_volume("mic_1", 200)).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::ValidationError);
        let err = rt.block_on(module.set_volume("mic_1", 20)).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::DeviceUnreachable);

        // the rejected and failed writes left the default state alone
        let detail = rt.block_on(module.get_device_status("mic_1")).unwrap();
        match detail.state {
            StateDtoEnum::Audio(audio) => assert_eq!(audio.volume, 50),
            other => panic!("unexpected state: {:?}", other),
        }
        module.shutdown();
    }
}
