pub mod appointment;
pub mod salon;
pub mod schedule;
pub mod settings;
pub mod staff;
pub mod time_off;
