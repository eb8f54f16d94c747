pub mod device_state_dto;
pub mod device_report_dto;
pub mod health_event_dto;
