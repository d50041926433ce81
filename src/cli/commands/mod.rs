//! CLI command implementations.

mod doctor;
mod export;
mod serve;
mod worker;

pub use doctor::run_doctor;
pub use export::run_export;
pub use serve::run_serve;
pub use worker::run_worker;
