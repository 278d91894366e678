//! Serial sensor hub.
//!
//! Reads gateway reports from a USB serial device, keeps a 24 hour rolling
//! window per sensor node, logs accepted reports to daily CSV files, serves
//! a temperature chart over HTTP and mirrors a short summary into an IRC
//! channel topic through [`channel_irc`].

pub mod app;
pub mod chart;
pub mod config;
pub mod device;
pub mod history;
pub mod logger;
pub mod pipeline;
pub mod report;
pub mod sensor_log;
pub mod summary;
pub mod web;
