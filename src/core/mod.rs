pub mod config;
pub mod connection;
pub mod latency;
pub mod pac;
pub mod profile;
pub mod service;
pub mod sysproxy;
