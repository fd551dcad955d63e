pub mod ai;
pub mod config;
pub mod history;
pub mod render;
pub mod session;
pub mod settings;
pub mod storage;
pub mod types;

#[cfg(feature = "ui")]
pub mod ui;
#[cfg(feature = "ui")]
pub mod views;
