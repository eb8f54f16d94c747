//! health event broadcast
//! explicit subscriber list instead of a language level event, so propagation
//! stays deterministic and testable

use std::sync::Mutex;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::entity::dto::health_event_dto::HealthChangedEventDto;

pub struct HealthEventBus {
    subscribers: Mutex<Vec<Sender<HealthChangedEventDto>>>,
}

impl HealthEventBus {
    pub fn new() -> Self {
        HealthEventBus { subscribers: Mutex::new(Vec::new()) }
    }

    pub fn subscribe(&self) -> Receiver<HealthChangedEventDto> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// fan the event out, dropped receivers are pruned on the way
    pub fn publish(&self, event: HealthChangedEventDto) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::dto::health_event_dto::HealthEnum;

    fn sample_event() -> HealthChangedEventDto {
        HealthChangedEventDto {
            device_id: "dev_1".to_string(),
            previous_health: HealthEnum::Offline,
            new_health: HealthEnum::Healthy,
            error_msg: None,
        }
    }

    #[test]
    fn test_subscribe_and_publish() {
        let bus = HealthEventBus::new();
        let rx_a = bus.subscribe();
        let rx_b = bus.subscribe();

        bus.publish(sample_event());

        assert_eq!(rx_a.recv().unwrap().device_id, "dev_1");
        assert_eq!(rx_b.recv().unwrap().device_id, "dev_1");
    }

    #[test]
    fn test_dead_subscriber_is_pruned() {
        let bus = HealthEventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        // publish twice, first call prunes, second still works
        bus.publish(sample_event());
        bus.publish(sample_event());

        let rx = bus.subscribe();
        bus.publish(sample_event());
        assert!(rx.recv().is_ok());
    }
}
