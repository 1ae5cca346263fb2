pub mod appointment;
pub mod push;
