pub mod config;
pub mod messages;
pub mod monitor;
pub mod motion;
pub mod runtime;
pub mod supervisor;
