//! device health model

use serde::{Deserialize, Serialize};

/// liveness of one device, computed per monitor tick
/// independent of the device logical on/off state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthEnum {
    Offline,
    Unhealthy,
    Healthy,
}

/// emitted exactly once per observed health transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChangedEventDto {
    pub device_id: String,
    pub previous_health: HealthEnum,
    pub new_health: HealthEnum,
    pub error_msg: Option<String>,
}
