//! generic module monitor loop
//! one thread per module, never per device, all devices of the module are
//! probed inside one tick and a failing device never aborts its siblings

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::health_event_bus::HealthEventBus;
use super::state_store::DeviceStateStore;
use super::traits::DeviceProbe;
use crate::entity::dto::health_event_dto::HealthEnum;
use crate::{error, info};

const LOG_TAG: &'static str = "monitor_thread";

/// spawn the monitor loop for one module
/// the loop owns a small runtime for the async probes and exits promptly when
/// the cancel token fires
pub fn start_monitor_thread(
    module_name: &'static str,
    interval_secs: u64,
    probe: Arc<dyn DeviceProbe>,
    store: Arc<DeviceStateStore>,
    event_bus: Arc<HealthEventBus>,
    cancel_token: CancellationToken,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                error!(LOG_TAG, "{}: cannot create monitor runtime, msg: {}", module_name, e);
                return;
            }
        };

        rt.block_on(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            info!(
                LOG_TAG,
                "{}: monitor loop started, interval: {}s", module_name, interval_secs.max(1)
            );
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        info!(LOG_TAG, "{}: monitor loop stopping on cancel", module_name);
                        break;
                    }
                    _ = tick.tick() => {
                        run_tick(module_name, probe.as_ref(), &store, &event_bus).await;
                    }
                }
            }
        });
    })
}

/// probe every device of the module once
async fn run_tick(
    module_name: &str,
    probe: &dyn DeviceProbe,
    store: &DeviceStateStore,
    event_bus: &HealthEventBus,
) {
    for device_id in store.device_ids() {
        // probe failures are folded into the health model, never propagated
        let (health, error_msg) = match probe.probe_device(&device_id).await {
            Ok(health) => (health, None),
            Err(e) => (HealthEnum::Offline, Some(e.to_string())),
        };
        if let Some(event) = store.apply_probe(&device_id, health, error_msg) {
            info!(
                LOG_TAG,
                "{}: health of {} changed {:?} -> {:?}",
                module_name, event.device_id, event.previous_health, event.new_health
            );
            event_bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::DriverError;
    use crate::common::logger::init_logger;
    use crate::entity::dto::device_state_dto::StateDtoEnum;
    use crate::module_controller::state_store::DeviceMetaInfo;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// probe that fails for one chosen device and counts every call
    struct FakeProbe {
        fail_device: String,
        calls: Mutex<HashMap<String, usize>>,
    }

    #[async_trait]
    impl DeviceProbe for FakeProbe {
        async fn probe_device(&self, device_id: &str) -> Result<HealthEnum, DriverError> {
            let mut calls = self.calls.lock().unwrap();
            *calls.entry(device_id.to_string()).or_insert(0) += 1;
            if device_id == self.fail_device {
                Err(DriverError("probe blew up".to_string()))
            } else {
                Ok(HealthEnum::Healthy)
            }
        }
    }

    fn make_store(ids: &[&str]) -> Arc<DeviceStateStore> {
        let store = Arc::new(DeviceStateStore::new());
        for id in ids {
            store.insert_device(DeviceMetaInfo::new(id, "dev", "model", StateDtoEnum::Empty));
        }
        store
    }

    #[test]
    fn test_failing_device_does_not_abort_siblings() {
        let _ = init_logger();
        let store = make_store(&["dev_a", "dev_b", "dev_c"]);
        let event_bus = Arc::new(HealthEventBus::new());
        let events = event_bus.subscribe();
        let probe = Arc::new(FakeProbe {
            fail_device: "dev_a".to_string(),
            calls: Mutex::new(HashMap::new()),
        });
        let cancel_token = CancellationToken::new();

        let handle = start_monitor_thread(
            "test_module",
            1,
            probe.clone(),
            store.clone(),
            event_bus.clone(),
            cancel_token.clone(),
        );

        // first tick fires immediately
        thread::sleep(Duration::from_millis(400));
        {
            let calls = probe.calls.lock().unwrap();
            assert!(calls.get("dev_a").copied().unwrap_or(0) >= 1);
            assert!(calls.get("dev_b").copied().unwrap_or(0) >= 1);
            assert!(calls.get("dev_c").copied().unwrap_or(0) >= 1);
        }

        // only the two healthy devices transitioned away from offline
        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert!(received.iter().all(|e| e.new_health == HealthEnum::Healthy));

        // second tick repeats the same result, no further events
        thread::sleep(Duration::from_millis(1200));
        assert_eq!(events.try_iter().count(), 0);

        cancel_token.cancel();
        handle.join().unwrap();

        // the failing device kept its error for diagnostics
        let detail = store.detail("dev_a").unwrap();
        assert_eq!(detail.health, HealthEnum::Offline);
        assert!(detail.errors.iter().any(|e| e.msg.contains("probe blew up")));
    }

    #[test]
    fn test_cancel_stops_loop_promptly() {
        let _ = init_logger();
        let store = make_store(&["dev_a"]);
        let event_bus = Arc::new(HealthEventBus::new());
        let probe = Arc::new(FakeProbe { fail_device: String::new(), calls: Mutex::new(HashMap::new()) });
        let cancel_token = CancellationToken::new();

        let handle = start_monitor_thread(
            "test_module",
            60,
            probe,
            store,
            event_bus,
            cancel_token.clone(),
        );
        thread::sleep(Duration::from_millis(100));
        cancel_token.cancel();
        handle.join().unwrap();
    }
}
