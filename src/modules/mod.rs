pub mod codec_module;
pub mod lighting_module;
pub mod display_module;
pub mod camera_module;
pub mod chromium_module;
pub mod audio_module;
