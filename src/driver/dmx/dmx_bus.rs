//! dmx bus controller
//! owns the usb serial bridge and the sender thread, many fixtures multiplex
//! into the single shared universe through disjoint channel ranges

use std::env;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tokio_util::sync::CancellationToken;

use super::dmx_thread::run_loop;
use super::prelude::*;
use super::universe::{SharedUniverse, UniverseBuffer};
use crate::common::error::DriverError;
use crate::{error, info};

const LOG_TAG: &str = "dmx_bus";

// dmx512 electrical parameters: 250 kbaud, 8 data bits, 2 stop bits, no parity
const DMX_BAUD_RATE: u32 = 250_000;
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

pub struct DmxBus {
    serial_port: String,
    frame_rate: u32,
    universe: SharedUniverse,
    frames_sent: Arc<AtomicU64>,
    transmitting: Arc<AtomicBool>,
    cancel_token: CancellationToken,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl DmxBus {
    pub fn new(serial_port: &str, frame_rate: u32) -> Self {
        DmxBus {
            serial_port: serial_port.to_string(),
            frame_rate,
            universe: Arc::new(Mutex::new(UniverseBuffer::new())),
            frames_sent: Arc::new(AtomicU64::new(0)),
            transmitting: Arc::new(AtomicBool::new(false)),
            cancel_token: CancellationToken::new(),
            thread_handle: None,
        }
    }

    /// open the adapter and start the sender thread
    /// a missing adapter is an error, the caller decides how to degrade
    pub fn start(&mut self) -> Result<(), DriverError> {
        if self.thread_handle.is_some() {
            return Ok(());
        }

        let port_opt = if dummy_mode() {
            info!(LOG_TAG, "dummy mode, pacing without a serial port");
            None
        } else {
            Some(self.open_port()?)
        };

        self.cancel_token = CancellationToken::new();
        let universe = self.universe.clone();
        let frames_sent = self.frames_sent.clone();
        let cancel_token = self.cancel_token.clone();
        let frame_rate = self.frame_rate;
        self.thread_handle = Some(thread::spawn(move || {
            run_loop(port_opt, universe, frame_rate, frames_sent, cancel_token);
        }));
        self.transmitting.store(true, Ordering::Relaxed);
        info!(
            LOG_TAG,
            "dmx bus started, port: {}, frame rate: {} fps", self.serial_port, self.frame_rate
        );
        Ok(())
    }

    fn open_port(&self) -> Result<Box<dyn SerialPort>, DriverError> {
        tokio_serial::new(self.serial_port.as_str(), DMX_BAUD_RATE)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::Two)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(|e| DriverError(format!("dmx bus: cannot open adapter {}, msg: {}", self.serial_port, e)))
    }

    /// write one channel of the universe
    pub fn set_channel(&self, channel: DmxChannel, value: DmxValue) {
        self.universe.lock().unwrap().set_channel(channel, value);
    }

    /// write several channels under one lock acquisition
    pub fn set_channels(&self, writes: &[(DmxChannel, DmxValue)]) {
        let mut universe_guard = self.universe.lock().unwrap();
        for (channel, value) in writes {
            universe_guard.set_channel(*channel, *value);
        }
    }

    pub fn get_channel(&self, channel: DmxChannel) -> Option<DmxValue> {
        self.universe.lock().unwrap().get_channel(channel)
    }

    pub fn is_transmitting(&self) -> bool {
        self.transmitting.load(Ordering::Relaxed)
    }

    /// shared flag for the lighting health probe
    pub fn transmitting_handle(&self) -> Arc<AtomicBool> {
        self.transmitting.clone()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// stop the sender thread and release the port
    pub fn stop(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!(LOG_TAG, "dmx worker thread panicked");
            }
        }
        self.transmitting.store(false, Ordering::Relaxed);
        info!(LOG_TAG, "dmx bus stopped, port: {}", self.serial_port);
    }
}

fn dummy_mode() -> bool {
    env::var("dummy").unwrap_or_else(|_| "false".to_string()) == "true"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::logger::init_logger;

    fn set_env() {
        env::set_var("dummy", "true");
        let _ = init_logger();
    }

    #[test]
    fn test_start_set_channel_stop() {
        set_env();
        let mut bus = DmxBus::new("/dev/ttyUSB0", 25);
        bus.start().unwrap();
        assert!(bus.is_transmitting());

        bus.set_channel(2, 30);
        assert_eq!(bus.get_channel(2), Some(30));

        thread::sleep(Duration::from_millis(200));
        assert!(bus.frames_sent() > 0);

        bus.stop();
        assert!(!bus.is_transmitting());
    }

    #[test]
    fn test_out_of_range_channel_is_ignored() {
        set_env();
        let mut bus = DmxBus::new("/dev/ttyUSB0", 25);
        bus.start().unwrap();
        bus.set_channels(&[(0, 99), (600, 99), (10, 55)]);
        assert_eq!(bus.get_channel(10), Some(55));
        assert_eq!(bus.get_channel(600), None);
        bus.stop();
    }
}
