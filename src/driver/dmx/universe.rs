//! dmx universe frame buffer
//! index 0 is the start code and stays 0x00, control logic writes channels
//! 1..=512 only, shared between fixture writers and the sender thread

use std::sync::{Arc, Mutex};

use super::prelude::*;

pub struct UniverseBuffer {
    frame: [DmxValue; DMX_FRAME_LEN],
}

impl UniverseBuffer {
    pub fn new() -> Self {
        UniverseBuffer { frame: [0; DMX_FRAME_LEN] }
    }

    /// write one channel, addresses outside 1..=512 are ignored
    pub fn set_channel(&mut self, channel: DmxChannel, value: DmxValue) {
        if channel < 1 || channel as usize > DMX_CHANNEL_LEN {
            return;
        }
        self.frame[channel as usize] = value;
    }

    pub fn get_channel(&self, channel: DmxChannel) -> Option<DmxValue> {
        if channel < 1 || channel as usize > DMX_CHANNEL_LEN {
            return None;
        }
        Some(self.frame[channel as usize])
    }

    pub fn frame(&self) -> &[DmxValue; DMX_FRAME_LEN] {
        &self.frame
    }
}

pub type SharedUniverse = Arc<Mutex<UniverseBuffer>>;
