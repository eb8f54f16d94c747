//! snapshots handed to the external api layer

use serde::{Deserialize, Serialize};

use super::device_state_dto::StateDtoEnum;
use super::health_event_dto::HealthEnum;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceErrorDto {
    // epoch millis
    pub timestamp: u64,
    pub msg: String,
}

/// list entry returned by get_devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummaryDto {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub health: HealthEnum,
    pub connected: bool,
}

/// full state returned by get_device_status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDetailDto {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub health: HealthEnum,
    pub connected: bool,
    pub last_seen: Option<u64>,
    pub state: StateDtoEnum,
    // most recent errors, oldest dropped first
    pub errors: Vec<DeviceErrorDto>,
}
