pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod errors;
pub mod logging;
pub mod polling;
pub mod progress;
pub mod status;
pub mod stream;
pub mod supervisor;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;
