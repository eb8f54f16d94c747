mod common;
mod driver;
mod entity;
mod module_controller;
mod modules;

use std::error::Error;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use dotenv::dotenv;

use log;
use common::logger::init_logger;
use common::setting::Settings;
use module_controller::health_event_bus::HealthEventBus;
use module_controller::traits::DeviceModule;
use modules::audio_module::AudioModule;
use modules::camera_module::CameraModule;
use modules::chromium_module::ChromiumModule;
use modules::codec_module::CodecModule;
use modules::display_module::DisplayModule;
use modules::lighting_module::LightingModule;

fn main() -> Result<(), Box<dyn Error>> {
    // check the env file
    dotenv().ok();

    init_logger()?;
    let settings = Settings::get();
    log::info!("configuration loaded, env: {}", settings.env.env);

    // health transitions go to the dashboard layer, here they land in the log
    let event_bus = Arc::new(HealthEventBus::new());
    let health_rx = event_bus.subscribe();
    thread::spawn(move || {
        while let Ok(event) = health_rx.recv() {
            log::info!(
                "health changed, device: {}, {:?} -> {:?}",
                event.device_id, event.previous_health, event.new_health
            );
        }
    });

    // 1. build one module per device category
    let mut modules: Vec<Box<dyn DeviceModule>> = vec![
        Box::new(CodecModule::new(settings.codec.clone(), event_bus.clone())),
        Box::new(LightingModule::new(settings.lighting.clone(), event_bus.clone())),
        Box::new(DisplayModule::new(settings.display.clone(), event_bus.clone())),
        Box::new(CameraModule::new(settings.camera.clone(), event_bus.clone())),
        Box::new(ChromiumModule::new(settings.chromium.clone(), event_bus.clone())),
        Box::new(AudioModule::new(settings.audio.clone(), event_bus.clone())),
    ];

    // 2. initialize, a failing module never takes the engine down
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        for module in modules.iter_mut() {
            match module.initialize().await {
                Ok(true) => log::info!("module {} initialized", module.module_name()),
                Ok(false) => log::info!("module {} disabled by config", module.module_name()),
                Err(e) => log::error!("module {} failed to initialize, msg: {}", module.module_name(), e),
            }
        }
    });

    // 3. run until ctrl-c
    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;
    log::info!("engine running, press ctrl-c to stop");
    let _ = stop_rx.recv();

    // 4. orderly shutdown
    for module in modules.iter_mut() {
        module.shutdown();
    }
    log::info!("all modules stopped");
    Ok(())
}
