//! dmx sender worker
//! fixtures expect a steady frame stream and hold last known values when it
//! stops, so the loop keeps its cadence through individual write failures

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio_serial::SerialPort;
use tokio_util::sync::CancellationToken;

use super::prelude::*;
use super::universe::SharedUniverse;
use crate::common::error::DriverError;
use crate::{info, warn};

const LOG_TAG: &str = "dmx_thread";

// frame preamble minimum durations per dmx512
const BREAK_MICROS: u64 = 176;
const MARK_AFTER_BREAK_MICROS: u64 = 12;

/// transmit the universe at a fixed frame rate until cancelled
/// port None is dummy mode, the loop still paces and counts frames
pub fn run_loop(
    mut port_opt: Option<Box<dyn SerialPort>>,
    universe: SharedUniverse,
    frame_rate: u32,
    frames_sent: Arc<AtomicU64>,
    cancel_token: CancellationToken,
) {
    let frame_period = Duration::from_micros(1_000_000 / frame_rate.max(1) as u64);
    info!(
        LOG_TAG,
        "dmx worker started, frame rate: {} fps, transmitting: {}",
        frame_rate,
        port_opt.is_some()
    );

    // local copy so the universe lock is never held during serial i/o
    let mut frame = [0u8; DMX_FRAME_LEN];

    while !cancel_token.is_cancelled() {
        let frame_started = Instant::now();
        {
            let universe_guard = universe.lock().unwrap();
            frame.copy_from_slice(universe_guard.frame());
        }

        if let Some(port) = port_opt.as_mut() {
            if let Err(e) = send_frame(port.as_mut(), &frame) {
                // transient failure, retry on the next frame
                warn!(LOG_TAG, "frame write failed, msg: {}", e);
            }
        }
        frames_sent.fetch_add(1, Ordering::Relaxed);

        let elapsed = frame_started.elapsed();
        if elapsed < frame_period {
            thread::sleep(frame_period - elapsed);
        }
    }
    info!(LOG_TAG, "dmx worker stopped");
}

/// one dmx frame: break, mark after break, start code plus 512 channel bytes
fn send_frame(port: &mut dyn SerialPort, frame: &[DmxValue; DMX_FRAME_LEN]) -> Result<(), DriverError> {
    port.set_break()
        .map_err(|e| DriverError(format!("dmx worker: set break failed, msg: {}", e)))?;
    thread::sleep(Duration::from_micros(BREAK_MICROS));
    port.clear_break()
        .map_err(|e| DriverError(format!("dmx worker: clear break failed, msg: {}", e)))?;
    thread::sleep(Duration::from_micros(MARK_AFTER_BREAK_MICROS));

    port.write_all(frame)
        .map_err(|e| DriverError(format!("dmx worker: frame write failed, msg: {}", e)))?;
    port.flush()
        .map_err(|e| DriverError(format!("dmx worker: flush failed, msg: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::logger::init_logger;
    use crate::driver::dmx::universe::UniverseBuffer;
    use std::sync::Mutex;

    #[test]
    fn test_dummy_cadence_matches_frame_rate() {
        let _ = init_logger();
        let universe: SharedUniverse = Arc::new(Mutex::new(UniverseBuffer::new()));
        let frames_sent = Arc::new(AtomicU64::new(0));
        let cancel_token = CancellationToken::new();

        let handle = {
            let universe = universe.clone();
            let frames_sent = frames_sent.clone();
            let cancel_token = cancel_token.clone();
            thread::spawn(move || run_loop(None, universe, 25, frames_sent, cancel_token))
        };

        thread::sleep(Duration::from_secs(1));
        cancel_token.cancel();
        handle.join().unwrap();

        // 25 fps over one second, wide scheduling tolerance
        let sent = frames_sent.load(Ordering::Relaxed);
        assert!((15..=40).contains(&sent), "unexpected frame count: {}", sent);
    }

    #[test]
    fn test_cancel_stops_worker() {
        let _ = init_logger();
        let universe: SharedUniverse = Arc::new(Mutex::new(UniverseBuffer::new()));
        let frames_sent = Arc::new(AtomicU64::new(0));
        let cancel_token = CancellationToken::new();
        cancel_token.cancel();

        let handle = {
            let universe = universe.clone();
            let frames_sent = frames_sent.clone();
            let cancel_token = cancel_token.clone();
            thread::spawn(move || run_loop(None, universe, 25, frames_sent, cancel_token))
        };
        handle.join().unwrap();
        assert_eq!(frames_sent.load(Ordering::Relaxed), 0);
    }
}
