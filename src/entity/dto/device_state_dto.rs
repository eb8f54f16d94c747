//! device state data transmission object

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StateDtoEnum {
    Empty,
    Codec(CodecStateDto),
    Lighting(LightingStateDto),
    Display(DisplayStateDto),
    Camera(CameraStateDto),
    Chromium(ChromiumStateDto),
    Audio(AudioStateDto),
}

// device states

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodecStateDto {
    // speaker volume 0..=100
    pub volume: i64,
    pub muted: bool,
    // firmware string reported by the device, refreshed by the monitor loop
    pub firmware: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RgbwColorDto {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub white: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LightingStateDto {
    pub color: RgbwColorDto,
    // brightness 0..=100, scales every component
    pub brightness: u8,
    pub on: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayStateDto {
    pub brightness: u8,
    pub on: bool,
    // controller ips that answered the last probe
    pub responding_ips: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraStateDto {
    // pan and tilt in the external -100..=100 range
    pub pan: i64,
    pub tilt: i64,
    // zoom factor 1.0..=5.0
    pub zoom: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChromiumStateDto {
    pub browser_version: Option<String>,
    pub tab_count: usize,
    pub active_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioStateDto {
    pub volume: i64,
    pub muted: bool,
}
