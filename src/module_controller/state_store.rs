//! per module device state store
//! every read and write goes through the store lock, held only for the in-memory
//! update, network i/o never happens under it

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::entity::dto::device_report_dto::{DeviceDetailDto, DeviceErrorDto, DeviceSummaryDto};
use crate::entity::dto::device_state_dto::StateDtoEnum;
use crate::entity::dto::health_event_dto::{HealthChangedEventDto, HealthEnum};

// most recent errors kept per device, oldest dropped first
const ERROR_RING_CAPACITY: usize = 10;

/// mutable record of one device, owned by the module store
#[derive(Debug, Clone)]
pub struct DeviceMetaInfo {
    pub device_id: String,
    pub name: String,
    pub model: String,
    pub health: HealthEnum,
    pub connected: bool,
    pub last_seen: Option<u64>,
    pub state: StateDtoEnum,
    pub errors: VecDeque<DeviceErrorDto>,
}

impl DeviceMetaInfo {
    pub fn new(device_id: &str, name: &str, model: &str, state: StateDtoEnum) -> Self {
        DeviceMetaInfo {
            device_id: device_id.to_string(),
            name: name.to_string(),
            model: model.to_string(),
            health: HealthEnum::Offline,
            connected: false,
            last_seen: None,
            state,
            errors: VecDeque::new(),
        }
    }
}

pub struct DeviceStateStore {
    map: Mutex<HashMap<String, DeviceMetaInfo>>,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        DeviceStateStore { map: Mutex::new(HashMap::new()) }
    }

    pub fn insert_device(&self, info: DeviceMetaInfo) {
        let mut map_guard = self.map.lock().unwrap();
        map_guard.insert(info.device_id.clone(), info);
    }

    pub fn clear(&self) {
        self.map.lock().unwrap().clear();
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.map.lock().unwrap().contains_key(device_id)
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.map.lock().unwrap().keys().cloned().collect()
    }

    /// snapshot for get_devices, no i/o behind it
    pub fn summaries(&self) -> Vec<DeviceSummaryDto> {
        let map_guard = self.map.lock().unwrap();
        map_guard
            .values()
            .map(|info| DeviceSummaryDto {
                device_id: info.device_id.clone(),
                name: info.name.clone(),
                model: info.model.clone(),
                health: info.health,
                connected: info.connected,
            })
            .collect()
    }

    /// snapshot for get_device_status
    pub fn detail(&self, device_id: &str) -> Option<DeviceDetailDto> {
        let map_guard = self.map.lock().unwrap();
        map_guard.get(device_id).map(|info| DeviceDetailDto {
            device_id: info.device_id.clone(),
            name: info.name.clone(),
            model: info.model.clone(),
            health: info.health,
            connected: info.connected,
            last_seen: info.last_seen,
            state: info.state.clone(),
            errors: info.errors.iter().cloned().collect(),
        })
    }

    /// mutate the type specific state of one device under the store lock
    pub fn update_state<F>(&self, device_id: &str, mutator: F) -> bool
    where
        F: FnOnce(&mut StateDtoEnum),
    {
        let mut map_guard = self.map.lock().unwrap();
        match map_guard.get_mut(device_id) {
            Some(info) => {
                mutator(&mut info.state);
                true
            }
            None => false,
        }
    }

    pub fn record_error(&self, device_id: &str, msg: &str) {
        let mut map_guard = self.map.lock().unwrap();
        if let Some(info) = map_guard.get_mut(device_id) {
            push_error(info, msg);
        }
    }

    /// fold one probe result into the store
    /// returns the transition event when the health actually changed, equal
    /// consecutive health values never produce a second event
    pub fn apply_probe(
        &self,
        device_id: &str,
        health: HealthEnum,
        error_msg: Option<String>,
    ) -> Option<HealthChangedEventDto> {
        let mut map_guard = self.map.lock().unwrap();
        let info = map_guard.get_mut(device_id)?;

        if let Some(msg) = &error_msg {
            // skip a repeat of the newest entry so a flapping device does not
            // flood the ring with identical lines
            if info.errors.back().map(|e| e.msg != *msg).unwrap_or(true) {
                push_error(info, msg);
            }
        }

        info.connected = health != HealthEnum::Offline;
        if info.connected {
            info.last_seen = Some(now_millis());
        }

        let previous_health = info.health;
        info.health = health;
        if previous_health == health {
            return None;
        }
        Some(HealthChangedEventDto {
            device_id: device_id.to_string(),
            previous_health,
            new_health: health,
            error_msg,
        })
    }
}

fn push_error(info: &mut DeviceMetaInfo, msg: &str) {
    if info.errors.len() == ERROR_RING_CAPACITY {
        info.errors.pop_front();
    }
    info.errors.push_back(DeviceErrorDto { timestamp: now_millis(), msg: msg.to_string() });
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
