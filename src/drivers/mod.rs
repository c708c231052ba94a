//! Platform task helpers.

pub mod task_pin;
