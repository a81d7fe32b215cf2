//! Background Tasks Module
//!
//! Tasks that run periodically during server operation.

mod sweep;

pub use sweep::spawn_sweep_task;
