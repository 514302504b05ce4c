#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod auth;
pub mod card;
pub mod config;
pub mod data;
pub mod feed;
pub mod format;
pub mod logging;
pub mod media;
pub mod reddit;
pub mod session;
pub mod storage;
pub mod timer;
pub mod ui;
pub mod video;
pub mod viewer;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
