//! video codec module
//! every codec is driven over its own persistent telnet session, commands are
//! the vendor command line vocabulary

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::common::error::{DeviceServerError, DriverError, ServerErrorCode};
use crate::common::setting::CodecSetting;
use crate::driver::telnet::telnet_client::TelnetClient;
use crate::entity::dto::device_report_dto::{DeviceDetailDto, DeviceSummaryDto};
use crate::entity::dto::device_state_dto::{CodecStateDto, StateDtoEnum};
use crate::entity::dto::health_event_dto::HealthEnum;
use crate::module_controller::health_event_bus::HealthEventBus;
use crate::module_controller::monitor_thread::start_monitor_thread;
use crate::module_controller::state_store::{DeviceMetaInfo, DeviceStateStore};
use crate::module_controller::traits::{DeviceModule, DeviceProbe};
use crate::{info, warn};

const LOG_TAG: &str = "codec_module";
const MODULE_NAME: &str = "codec";

// vendor command vocabulary, fixed for the modeled codec
const CMD_GET_VERSION: &str = "DEVICE get version";
const CMD_REBOOT: &str = "DEVICE reboot";
const CMD_GET_VOLUME: &str = "Audio get volume";
const CMD_SET_VOLUME: &str = "Audio set volume";
const CMD_GET_MUTE: &str = "Audio get mute";
const CMD_SET_MUTE: &str = "Audio set mute";
const CMD_SET_PAN: &str = "Camera set pan";
const CMD_SET_TILT: &str = "Camera set tilt";
const CMD_SET_ZOOM: &str = "Camera set zoom";

pub struct CodecModule {
    setting: CodecSetting,
    store: Arc<DeviceStateStore>,
    event_bus: Arc<HealthEventBus>,
    clients: HashMap<String, Arc<TelnetClient>>,
    cancel_token: CancellationToken,
    monitor_handle: Option<thread::JoinHandle<()>>,
    initialized: bool,
}

/// probe asks for the firmware version, a parsed answer is proof of life
struct CodecProbe {
    clients: HashMap<String, Arc<TelnetClient>>,
    store: Arc<DeviceStateStore>,
}

#[async_trait]
impl DeviceProbe for CodecProbe {
    async fn probe_device(&self, device_id: &str) -> Result<HealthEnum, DriverError> {
        let client = self
            .clients
            .get(device_id)
            .ok_or_else(|| DriverError(format!("codec probe: no client for {}", device_id)))?;
        match client.send_command(CMD_GET_VERSION) {
            Some(version) => {
                self.store.update_state(device_id, |state| {
                    if let StateDtoEnum::Codec(codec) = state {
                        codec.firmware = Some(version.clone());
                    }
                });
                Ok(HealthEnum::Healthy)
            }
            None => Err(DriverError("codec not answering version query".to_string())),
        }
    }
}

impl CodecModule {
    pub fn new(setting: CodecSetting, event_bus: Arc<HealthEventBus>) -> Self {
        CodecModule {
            setting,
            store: Arc::new(DeviceStateStore::new()),
            event_bus,
            clients: HashMap::new(),
            cancel_token: CancellationToken::new(),
            monitor_handle: None,
            initialized: false,
        }
    }

    fn client(&self, device_id: &str) -> Result<&Arc<TelnetClient>, DeviceServerError> {
        self.clients.get(device_id).ok_or_else(|| DeviceServerError {
            code: ServerErrorCode::DeviceNotFound,
            msg: format!("unknown codec device id: {}", device_id),
        })
    }

    fn unreachable(&self, device_id: &str, what: &str) -> DeviceServerError {
        let msg = format!("codec {} did not answer {}", device_id, what);
        self.store.record_error(device_id, &msg);
        DeviceServerError { code: ServerErrorCode::DeviceUnreachable, msg }
    }

    /// set speaker volume, 0..=100
    pub fn set_volume(&self, device_id: &str, volume: i64) -> Result<(), DeviceServerError> {
        let client = self.client(device_id)?;
        if !(0..=100).contains(&volume) {
            return Err(DeviceServerError {
                code: ServerErrorCode::ValidationError,
                msg: format!("volume out of range 0..=100: {}", volume),
            });
        }
        match client.send_command(&format!("{} {}", CMD_SET_VOLUME, volume)) {
            Some(_) => {
                self.store.update_state(device_id, |state| {
                    if let StateDtoEnum::Codec(codec) = state {
                        codec.volume = volume;
                    }
                });
                Ok(())
            }
            None => Err(self.unreachable(device_id, "volume command")),
        }
    }

    /// read the volume back from the device and refresh the cache
    pub fn get_volume(&self, device_id: &str) -> Result<i64, DeviceServerError> {
        let client = self.client(device_id)?;
        let raw = client
            .send_command(CMD_GET_VOLUME)
            .ok_or_else(|| self.unreachable(device_id, "volume query"))?;
        let volume = raw.parse::<i64>().map_err(|_| DeviceServerError {
            code: ServerErrorCode::ProtocolError,
            msg: format!("codec returned unparsable volume: {}", raw),
        })?;
        self.store.update_state(device_id, |state| {
            if let StateDtoEnum::Codec(codec) = state {
                codec.volume = volume;
            }
        });
        Ok(volume)
    }

    pub fn set_muted(&self, device_id: &str, muted: bool) -> Result<(), DeviceServerError> {
        let client = self.client(device_id)?;
        let arg = if muted { "on" } else { "off" };
        match client.send_command(&format!("{} {}", CMD_SET_MUTE, arg)) {
            Some(_) => {
                self.store.update_state(device_id, |state| {
                    if let StateDtoEnum::Codec(codec) = state {
                        codec.muted = muted;
                    }
                });
                Ok(())
            }
            None => Err(self.unreachable(device_id, "mute command")),
        }
    }

    pub fn get_muted(&self, device_id: &str) -> Result<bool, DeviceServerError> {
        let client = self.client(device_id)?;
        let raw = client
            .send_command(CMD_GET_MUTE)
            .ok_or_else(|| self.unreachable(device_id, "mute query"))?;
        let muted = raw == "on";
        self.store.update_state(device_id, |state| {
            if let StateDtoEnum::Codec(codec) = state {
                codec.muted = muted;
            }
        });
        Ok(muted)
    }

    /// drive the codec built-in camera
    /// pan and tilt are -100..=100, zoom factor 1.0..=5.0
    pub fn set_camera_position(
        &self,
        device_id: &str,
        pan: i64,
        tilt: i64,
        zoom: f64,
    ) -> Result<(), DeviceServerError> {
        let client = self.client(device_id)?;
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
        for cmd in [
            format!("{} {}", CMD_SET_PAN, pan),
            format!("{} {}", CMD_SET_TILT, tilt),
            format!("{} {}", CMD_SET_ZOOM, zoom),
        ] {
            if client.send_command(&cmd).is_none() {
                return Err(self.unreachable(device_id, "camera command"));
            }
        }
        Ok(())
    }

    /// restart the device, the session always ends disconnected
    pub fn reboot(&self, device_id: &str) -> Result<(), DeviceServerError> {
        let client = self.client(device_id)?;
        if client.send_reboot(CMD_REBOOT) {
            info!(LOG_TAG, "codec {} rebooting", device_id);
            Ok(())
        } else {
            Err(self.unreachable(device_id, "reboot command"))
        }
    }
}

fn initial_state() -> StateDtoEnum {
    StateDtoEnum::Codec(CodecStateDto { volume: 0, muted: false, firmware: None })
}

#[async_trait]
impl DeviceModule for CodecModule {
    fn module_name(&self) -> &'static str {
        MODULE_NAME
    }

    async fn initialize(&mut self) -> Result<bool, DeviceServerError> {
        if !self.setting.enabled {
            info!(LOG_TAG, "codec module disabled by config");
            return Ok(false);
        }
        if self.initialized {
            return Ok(true);
        }

        // 1. build store entries and one client per device
        for po in &self.setting.devices {
            self.store.insert_device(DeviceMetaInfo::new(&po.device_id, &po.name, &po.model, initial_state()));
            let client = Arc::new(TelnetClient::new(&po.host, po.port, &po.username, &po.password));
            // best effort first contact, the monitor loop retries offline devices
            if let Err(e) = client.connect() {
                warn!(LOG_TAG, "codec {} not reachable yet, msg: {}", po.device_id, e);
                self.store.record_error(&po.device_id, &e.to_string());
            }
            self.clients.insert(po.device_id.clone(), client);
        }

        // 2. monitor loop
        let probe = Arc::new(CodecProbe { clients: self.clients.clone(), store: self.store.clone() });
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
            msg: format!("unknown codec device id: {}", device_id),
        })
    }

    fn shutdown(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.monitor_handle.take() {
            let _ = handle.join();
        }
        for client in self.clients.values() {
            client.disconnect();
        }
        self.clients.clear();
        self.store.clear();
        self.initialized = false;
        info!(LOG_TAG, "codec module stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::logger::init_logger;
    use crate::entity::po::device_po::CodecDevicePo;

    fn test_setting(port: u16) -> CodecSetting {
        CodecSetting {
            enabled: true,
            monitor_interval_secs: 1,
            devices: vec![CodecDevicePo {
                device_id: "codec_1".to_string(),
                name: "room codec".to_string(),
                model: "sx80".to_string(),
                host: "127.0.0.1".to_string(),
                port,
                username: "admin".to_string(),
                password: "secret".to_string(),
            }],
        }
    }

    /// unreachable device: module still initializes, control calls fail typed
    #[test]
    fn test_offline_device_yields_typed_failures() {
        let _ = init_logger();
        // port without a listener
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut module = CodecModule::new(test_setting(port), Arc::new(HealthEventBus::new()));
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert!(rt.block_on(module.initialize()).unwrap());

        let err = module.set_volume("codec_1", 30).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::DeviceUnreachable);

        // the failure stays in the error ring
        let detail = rt.block_on(module.get_device_status("codec_1")).unwrap();
        assert!(!detail.errors.is_empty());
        module.shutdown();
    }

    #[test]
    fn test_validation_happens_before_io() {
        let _ = init_logger();
        let mut module = CodecModule::new(test_setting(9), Arc::new(HealthEventBus::new()));
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert!(rt.block_on(module.initialize()).unwrap());

        let err = module.set_volume("codec_1", 101).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::ValidationError);
        let err = module.set_camera_position("codec_1", 101, 0, 2.0).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::ValidationError);
        let err = module.set_camera_position("codec_1", 0, 0, 0.5).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::ValidationError);
        let err = module.set_volume("ghost", 10).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::DeviceNotFound);
        module.shutdown();
    }

    #[test]
    fn test_module_disabled_by_config() {
        let _ = init_logger();
        let mut setting = test_setting(9);
        setting.enabled = false;
        let mut module = CodecModule::new(setting, Arc::new(HealthEventBus::new()));
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert!(!rt.block_on(module.initialize()).unwrap());
        assert!(module.get_devices().is_empty());
    }
}
