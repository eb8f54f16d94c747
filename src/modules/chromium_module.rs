//! kiosk chromium module
//! the browser is just another device: probed over the devtools http endpoint,
//! navigation opens a tab, everything deeper stays outside the engine

use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::common::error::{DeviceServerError, DriverError, ServerErrorCode};
use crate::common::setting::ChromiumSetting;
use crate::driver::http::chromium_client;
use crate::entity::dto::device_report_dto::{DeviceDetailDto, DeviceSummaryDto};
use crate::entity::dto::device_state_dto::{ChromiumStateDto, StateDtoEnum};
use crate::entity::dto::health_event_dto::HealthEnum;
use crate::entity::po::device_po::ChromiumDevicePo;
use crate::module_controller::health_event_bus::HealthEventBus;
use crate::module_controller::monitor_thread::start_monitor_thread;
use crate::module_controller::state_store::{DeviceMetaInfo, DeviceStateStore};
use crate::module_controller::traits::{DeviceModule, DeviceProbe};
use crate::info;

const LOG_TAG: &str = "chromium_module";
const MODULE_NAME: &str = "chromium";

pub struct ChromiumModule {
    setting: ChromiumSetting,
    store: Arc<DeviceStateStore>,
    event_bus: Arc<HealthEventBus>,
    client: Client,
    cancel_token: CancellationToken,
    monitor_handle: Option<thread::JoinHandle<()>>,
    initialized: bool,
}

struct ChromiumProbe {
    devices: Vec<ChromiumDevicePo>,
    client: Client,
    store: Arc<DeviceStateStore>,
}

#[async_trait]
impl DeviceProbe for ChromiumProbe {
    async fn probe_device(&self, device_id: &str) -> Result<HealthEnum, DriverError> {
        let po = self
            .devices
            .iter()
            .find(|po| po.device_id == device_id)
            .ok_or_else(|| DriverError(format!("chromium probe: no config for {}", device_id)))?;

        let version = chromium_client::get_version(&self.client, &po.devtools_host, po.devtools_port).await?;
        let browser_version = version.get("Browser").and_then(|v| v.as_str()).map(|s| s.to_string());

        // tab listing is best effort on top of a live devtools endpoint
        let tabs = chromium_client::list_tabs(&self.client, &po.devtools_host, po.devtools_port)
            .await
            .unwrap_or_default();
        let active_url = tabs
            .iter()
            .find(|tab| tab.get("type").and_then(|v| v.as_str()) == Some("page"))
            .and_then(|tab| tab.get("url").and_then(|v| v.as_str()))
            .map(|s| s.to_string());
        let tab_count = tabs.len();

        self.store.update_state(device_id, |state| {
            if let StateDtoEnum::Chromium(chromium) = state {
                chromium.browser_version = browser_version.clone();
                chromium.tab_count = tab_count;
                chromium.active_url = active_url.clone();
            }
        });
        Ok(HealthEnum::Healthy)
    }
}

impl ChromiumModule {
    pub fn new(setting: ChromiumSetting, event_bus: Arc<HealthEventBus>) -> Self {
        ChromiumModule {
            setting,
            store: Arc::new(DeviceStateStore::new()),
            event_bus,
            client: Client::new(),
            cancel_token: CancellationToken::new(),
            monitor_handle: None,
            initialized: false,
        }
    }

    fn find_device(&self, device_id: &str) -> Result<&ChromiumDevicePo, DeviceServerError> {
        self.setting
            .devices
            .iter()
            .find(|po| po.device_id == device_id)
            .ok_or_else(|| DeviceServerError {
                code: ServerErrorCode::DeviceNotFound,
                msg: format!("unknown chromium device id: {}", device_id),
            })
    }

    /// open a tab on the given url
    pub async fn navigate(&self, device_id: &str, url: &str) -> Result<(), DeviceServerError> {
        let po = self.find_device(device_id)?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DeviceServerError {
                code: ServerErrorCode::ValidationError,
                msg: format!("url must be http(s): {}", url),
            });
        }
        chromium_client::open_tab(&self.client, &po.devtools_host, po.devtools_port, url)
            .await
            .map_err(|e| {
                self.store.record_error(device_id, &e.to_string());
                DeviceServerError { code: ServerErrorCode::DeviceUnreachable, msg: e.to_string() }
            })
    }
}

fn initial_state() -> StateDtoEnum {
    StateDtoEnum::Chromium(ChromiumStateDto { browser_version: None, tab_count: 0, active_url: None })
}

#[async_trait]
impl DeviceModule for ChromiumModule {
    fn module_name(&self) -> &'static str {
        MODULE_NAME
    }

    async fn initialize(&mut self) -> Result<bool, DeviceServerError> {
        if !self.setting.enabled {
            info!(LOG_TAG, "chromium module disabled by config");
            return Ok(false);
        }
        if self.initialized {
            return Ok(true);
        }

        for po in &self.setting.devices {
            self.store.insert_device(DeviceMetaInfo::new(&po.device_id, &po.name, &po.model, initial_state()));
        }

        let probe = Arc::new(ChromiumProbe {
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
            msg: format!("unknown chromium device id: {}", device_id),
        })
    }

    fn shutdown(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.monitor_handle.take() {
            let _ = handle.join();
        }
        self.store.clear();
        self.initialized = false;
        info!(LOG_TAG, "chromium module stopped");
    }
}
