pub mod action_queue;
pub mod appointment_service;
pub mod auto_assignment;
pub mod availability;
pub mod conflict_detector;
pub mod conflict_resolver;
pub mod metrics_service;
pub mod salon_service;
pub mod schedule_optimizer;
pub mod schedule_utils;
pub mod session;
pub mod settings_service;
pub mod staff_service;
pub mod time_off_service;
