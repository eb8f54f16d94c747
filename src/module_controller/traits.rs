//! module contracts

use async_trait::async_trait;

use crate::common::error::{DeviceServerError, DriverError};
use crate::entity::dto::device_report_dto::{DeviceDetailDto, DeviceSummaryDto};
use crate::entity::dto::health_event_dto::HealthEnum;

/// uniform lifecycle of one device category
#[async_trait]
pub trait DeviceModule: Send {
    fn module_name(&self) -> &'static str;

    /// idempotent, returns false without side effects when disabled by config
    /// initial per device connection is best effort, failures are logged and the
    /// device starts offline until the monitor loop reaches it
    async fn initialize(&mut self) -> Result<bool, DeviceServerError>;

    /// lock guarded snapshot, never blocks on network i/o
    fn get_devices(&self) -> Vec<DeviceSummaryDto>;

    /// full state snapshot, may opportunistically refresh a cached value over
    /// http but stays bounded by the client timeout
    async fn get_device_status(&self, device_id: &str) -> Result<DeviceDetailDto, DeviceServerError>;

    /// cancel the monitor loop, join it, release transports, clear state
    fn shutdown(&mut self);
}

/// probe one device, called by the generic monitor loop
/// an Err maps to Offline and lands in the device error ring
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn probe_device(&self, device_id: &str) -> Result<HealthEnum, DriverError>;
}
