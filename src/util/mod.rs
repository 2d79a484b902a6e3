//! Shared utilities.

pub mod clock;
pub mod cpu;
pub mod priority;
pub mod telemetry;

pub use clock::*;
pub use cpu::*;
pub use priority::*;
pub use telemetry::*;
