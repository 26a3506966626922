pub mod adapters;
pub mod adb;
pub mod config;
pub mod dump;
pub mod error;
pub mod log_session;
pub mod logging;
pub mod models;
pub mod operation_lock;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;
