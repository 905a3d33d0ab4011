pub mod config;
pub mod extension;
