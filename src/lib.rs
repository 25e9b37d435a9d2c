pub mod application;
pub mod coalesce;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod logging;
pub mod routing;
