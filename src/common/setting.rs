//! setting config file
//! one section per device category, loaded once at startup and never hot reloaded

use std::{fs::File, io::Read};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::env;

use crate::entity::po::device_po::{
    AudioDevicePo, CameraDevicePo, ChromiumDevicePo, CodecDevicePo, DisplayDevicePo,
    LightingDevicePo,
};

#[derive(Debug, Deserialize)]
pub struct Meta {
    pub application_name: String,
    pub server_name: String,
}

#[derive(Debug, Deserialize)]
pub struct Env {
    pub debug: bool,
    pub env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodecSetting {
    pub enabled: bool,
    pub monitor_interval_secs: u64,
    pub devices: Vec<CodecDevicePo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LightingSetting {
    pub enabled: bool,
    pub monitor_interval_secs: u64,
    // usb serial bridge of the dmx adapter
    pub serial_port: String,
    pub frame_rate: u32,
    pub devices: Vec<LightingDevicePo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplaySetting {
    pub enabled: bool,
    pub monitor_interval_secs: u64,
    pub devices: Vec<DisplayDevicePo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraSetting {
    pub enabled: bool,
    pub monitor_interval_secs: u64,
    pub devices: Vec<CameraDevicePo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSetting {
    pub enabled: bool,
    pub monitor_interval_secs: u64,
    pub devices: Vec<ChromiumDevicePo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioSetting {
    pub enabled: bool,
    pub monitor_interval_secs: u64,
    pub devices: Vec<AudioDevicePo>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub meta: Meta,
    pub env: Env,
    pub codec: CodecSetting,
    pub lighting: LightingSetting,
    pub display: DisplaySetting,
    pub camera: CameraSetting,
    pub chromium: ChromiumSetting,
    pub audio: AudioSetting,
}

impl Default for Settings {
    fn default() -> Self {
        let env = match env::var("ENV") {
            Ok(e) => e,
            Err(_) => {
                log::warn!("no ENV set, use default: 'dev'");
                String::from("dev")
            }
        };

        let file_path: String = format!("config_{}.toml", env);

        let mut file = match File::open(file_path.as_str()) {
            Ok(f) => f,
            Err(e) => panic!("no such file {} exception:{}", file_path.as_str(), e)
        };

        let mut str_val = String::new();

        match file.read_to_string(&mut str_val) {
            Ok(s) => s,
            Err(e) => panic!("cannot read config file: {}", e)
        };

        toml::from_str(&str_val).expect("config file format invalid")
    }
}

impl Settings {
    pub fn get<'a>() -> &'a Self {
        lazy_static! {
            static ref CACHE: Settings = Settings::default();
        }
        &CACHE
    }
}
