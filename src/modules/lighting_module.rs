//! dmx lighting module
//! owns the single dmx bus, every configured fixture maps its rgbw components
//! onto disjoint universe channels

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::common::error::{DeviceServerError, DriverError, ServerErrorCode};
use crate::common::setting::LightingSetting;
use crate::driver::dmx::dmx_bus::DmxBus;
use crate::driver::dmx::prelude::*;
use crate::entity::dto::device_report_dto::{DeviceDetailDto, DeviceSummaryDto};
use crate::entity::dto::device_state_dto::{LightingStateDto, RgbwColorDto, StateDtoEnum};
use crate::entity::dto::health_event_dto::HealthEnum;
use crate::entity::po::device_po::LightingDevicePo;
use crate::module_controller::health_event_bus::HealthEventBus;
use crate::module_controller::monitor_thread::start_monitor_thread;
use crate::module_controller::state_store::{DeviceMetaInfo, DeviceStateStore};
use crate::module_controller::traits::{DeviceModule, DeviceProbe};
use crate::{info, warn};

const LOG_TAG: &str = "lighting_module";
const MODULE_NAME: &str = "lighting";

pub struct LightingModule {
    setting: LightingSetting,
    store: Arc<DeviceStateStore>,
    event_bus: Arc<HealthEventBus>,
    bus: DmxBus,
    cancel_token: CancellationToken,
    monitor_handle: Option<thread::JoinHandle<()>>,
    initialized: bool,
}

/// dmx is a unidirectional broadcast, fixture health is the health of the
/// transmitter itself
struct LightingProbe {
    transmitting: Arc<AtomicBool>,
}

#[async_trait]
impl DeviceProbe for LightingProbe {
    async fn probe_device(&self, _device_id: &str) -> Result<HealthEnum, DriverError> {
        if self.transmitting.load(Ordering::Relaxed) {
            Ok(HealthEnum::Healthy)
        } else {
            Ok(HealthEnum::Offline)
        }
    }
}

impl LightingModule {
    pub fn new(setting: LightingSetting, event_bus: Arc<HealthEventBus>) -> Self {
        let bus = DmxBus::new(setting.serial_port.as_str(), setting.frame_rate);
        LightingModule {
            setting,
            store: Arc::new(DeviceStateStore::new()),
            event_bus,
            bus,
            cancel_token: CancellationToken::new(),
            monitor_handle: None,
            initialized: false,
        }
    }

    fn find_device(&self, device_id: &str) -> Result<&LightingDevicePo, DeviceServerError> {
        self.setting
            .devices
            .iter()
            .find(|po| po.device_id == device_id)
            .ok_or_else(|| DeviceServerError {
                code: ServerErrorCode::DeviceNotFound,
                msg: format!("unknown lighting device id: {}", device_id),
            })
    }

    /// set the rgbw color of one fixture
    pub fn set_color(&self, device_id: &str, color: RgbwColorDto) -> Result<(), DeviceServerError> {
        let po = self.find_device(device_id)?;
        let mut applied = None;
        self.store.update_state(device_id, |state| {
            if let StateDtoEnum::Lighting(lighting) = state {
                lighting.color = color;
                applied = Some(lighting.clone());
            }
        });
        if let Some(lighting) = applied {
            self.write_fixture(po, &lighting);
        }
        Ok(())
    }

    /// set fixture brightness, 0..=100
    pub fn set_brightness(&self, device_id: &str, brightness: i64) -> Result<(), DeviceServerError> {
        let po = self.find_device(device_id)?;
        if !(0..=100).contains(&brightness) {
            return Err(DeviceServerError {
                code: ServerErrorCode::ValidationError,
                msg: format!("brightness out of range 0..=100: {}", brightness),
            });
        }
        let mut applied = None;
        self.store.update_state(device_id, |state| {
            if let StateDtoEnum::Lighting(lighting) = state {
                lighting.brightness = brightness as u8;
                applied = Some(lighting.clone());
            }
        });
        if let Some(lighting) = applied {
            self.write_fixture(po, &lighting);
        }
        Ok(())
    }

    /// switch the fixture on or off, a disabled fixture drives all channels to 0
    pub fn set_enabled(&self, device_id: &str, on: bool) -> Result<(), DeviceServerError> {
        let po = self.find_device(device_id)?;
        let mut applied = None;
        self.store.update_state(device_id, |state| {
            if let StateDtoEnum::Lighting(lighting) = state {
                lighting.on = on;
                applied = Some(lighting.clone());
            }
        });
        if let Some(lighting) = applied {
            self.write_fixture(po, &lighting);
        }
        Ok(())
    }

    fn write_fixture(&self, po: &LightingDevicePo, state: &LightingStateDto) {
        let mut writes: Vec<(DmxChannel, DmxValue)> = vec![
            (po.red_channel, scale_channel(state.color.red, state.brightness, state.on)),
            (po.green_channel, scale_channel(state.color.green, state.brightness, state.on)),
            (po.blue_channel, scale_channel(state.color.blue, state.brightness, state.on)),
        ];
        if let Some(white_channel) = po.white_channel {
            writes.push((white_channel, scale_channel(state.color.white, state.brightness, state.on)));
        }
        self.bus.set_channels(&writes);
    }
}

/// channel byte for one color component, gated by the fixture switch
pub fn scale_channel(component: u8, brightness: u8, enabled: bool) -> DmxValue {
    if !enabled {
        return 0;
    }
    let scaled = (component as f64 * brightness as f64 / 100.0).round();
    scaled.clamp(0.0, 255.0) as DmxValue
}

fn initial_state() -> StateDtoEnum {
    StateDtoEnum::Lighting(LightingStateDto {
        color: RgbwColorDto { red: 0, green: 0, blue: 0, white: 0 },
        brightness: 100,
        on: false,
    })
}

#[async_trait]
impl DeviceModule for LightingModule {
    fn module_name(&self) -> &'static str {
        MODULE_NAME
    }

    async fn initialize(&mut self) -> Result<bool, DeviceServerError> {
        if !self.setting.enabled {
            info!(LOG_TAG, "lighting module disabled by config");
            return Ok(false);
        }
        if self.initialized {
            return Ok(true);
        }

        // 1. populate the store from config
        for po in &self.setting.devices {
            self.store.insert_device(DeviceMetaInfo::new(&po.device_id, &po.name, &po.model, initial_state()));
        }

        // 2. open the adapter, a missing bridge disables dmx output and leaves
        //    every fixture offline, the rest of the engine keeps running
        if let Err(e) = self.bus.start() {
            warn!(LOG_TAG, "dmx output disabled, msg: {}", e);
            for device_id in self.store.device_ids() {
                self.store.record_error(&device_id, &e.to_string());
            }
        }

        // 3. monitor loop
        let probe = Arc::new(LightingProbe { transmitting: self.bus.transmitting_handle() });
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
            msg: format!("unknown lighting device id: {}", device_id),
        })
    }

    fn shutdown(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.monitor_handle.take() {
            let _ = handle.join();
        }
        self.bus.stop();
        self.store.clear();
        self.initialized = false;
        info!(LOG_TAG, "lighting module stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::logger::init_logger;
    use std::env;

    fn set_env() {
        env::set_var("dummy", "true");
        let _ = init_logger();
    }

    fn test_setting() -> LightingSetting {
        LightingSetting {
            enabled: true,
            monitor_interval_secs: 1,
            serial_port: "/dev/ttyUSB0".to_string(),
            frame_rate: 25,
            devices: vec![
                LightingDevicePo {
                    device_id: "spot_1".to_string(),
                    name: "stage left".to_string(),
                    model: "rgbw par".to_string(),
                    red_channel: 1,
                    green_channel: 2,
                    blue_channel: 3,
                    white_channel: Some(4),
                },
                LightingDevicePo {
                    device_id: "strip_1".to_string(),
                    name: "wall wash".to_string(),
                    model: "rgb strip".to_string(),
                    red_channel: 10,
                    green_channel: 11,
                    blue_channel: 12,
                    white_channel: None,
                },
            ],
        }
    }

    fn init_module() -> LightingModule {
        set_env();
        let mut module = LightingModule::new(test_setting(), Arc::new(HealthEventBus::new()));
        let rt = tokio::runtime::Runtime::new().unwrap();
        assert!(rt.block_on(module.initialize()).unwrap());
        module
    }

    #[test]
    fn test_scale_channel_math() {
        assert_eq!(scale_channel(255, 100, true), 255);
        assert_eq!(scale_channel(128, 50, true), 64);
        assert_eq!(scale_channel(10, 0, true), 0);
        assert_eq!(scale_channel(200, 100, false), 0);
        assert_eq!(scale_channel(51, 33, true), 17);
    }

    #[test]
    fn test_color_lands_on_mapped_channels() {
        let mut module = init_module();
        module.set_enabled("spot_1", true).unwrap();
        module
            .set_color("spot_1", RgbwColorDto { red: 255, green: 128, blue: 0, white: 10 })
            .unwrap();

        assert_eq!(module.bus.get_channel(1), Some(255));
        assert_eq!(module.bus.get_channel(2), Some(128));
        assert_eq!(module.bus.get_channel(3), Some(0));
        assert_eq!(module.bus.get_channel(4), Some(10));
        module.shutdown();
    }

    #[test]
    fn test_brightness_scales_and_disable_zeroes() {
        let mut module = init_module();
        module.set_enabled("strip_1", true).unwrap();
        module
            .set_color("strip_1", RgbwColorDto { red: 200, green: 100, blue: 50, white: 0 })
            .unwrap();
        module.set_brightness("strip_1", 50).unwrap();

        assert_eq!(module.bus.get_channel(10), Some(100));
        assert_eq!(module.bus.get_channel(11), Some(50));
        assert_eq!(module.bus.get_channel(12), Some(25));

        module.set_enabled("strip_1", false).unwrap();
        assert_eq!(module.bus.get_channel(10), Some(0));
        assert_eq!(module.bus.get_channel(11), Some(0));
        assert_eq!(module.bus.get_channel(12), Some(0));
        module.shutdown();
    }

    #[test]
    fn test_brightness_validation_keeps_state() {
        let mut module = init_module();
        module.set_brightness("spot_1", 80).unwrap();

        let err = module.set_brightness("spot_1", 101).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::ValidationError);
        let err = module.set_brightness("spot_1", -1).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::ValidationError);

        let rt = tokio::runtime::Runtime::new().unwrap();
        let detail = rt.block_on(module.get_device_status("spot_1")).unwrap();
        match detail.state {
            StateDtoEnum::Lighting(lighting) => assert_eq!(lighting.brightness, 80),
            other => panic!("unexpected state: {:?}", other),
        }
        module.shutdown();
    }

    #[test]
    fn test_unknown_device_rejected() {
        let mut module = init_module();
        let err = module.set_brightness("ghost", 10).unwrap_err();
        assert_eq!(err.code, ServerErrorCode::DeviceNotFound);
        module.shutdown();
    }
}
