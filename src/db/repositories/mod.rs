pub mod appointment_repository;
pub mod salon_repository;
pub mod settings_repository;
pub mod staff_repository;
pub mod time_off_repository;
