//! per category device config records
//! loaded once from the config file before initialize, never mutated by the engine

use serde::{Deserialize, Serialize};

/// telnet controlled video codec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecDevicePo {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// dmx lighting fixture, rgbw channel mapping into the shared universe
/// channel addresses are 1..=512, fixtures must not overlap (config invariant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightingDevicePo {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub red_channel: u16,
    pub green_channel: u16,
    pub blue_channel: u16,
    pub white_channel: Option<u16>,
}

/// led video wall with redundant controller ips
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayDevicePo {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub ips: Vec<String>,
    pub port: u16,
}

/// ptz camera behind the companion controller service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraDevicePo {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub controller_host: String,
    pub controller_port: u16,
}

/// kiosk chromium instance, reached over the devtools http endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromiumDevicePo {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub devtools_host: String,
    pub devtools_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AudioDeviceKindEnum {
    Microphone,
    Speaker,
}

/// network microphone or speaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDevicePo {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub host: String,
    pub port: u16,
    pub kind: AudioDeviceKindEnum,
}
