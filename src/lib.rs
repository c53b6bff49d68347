pub mod config;
pub mod desk;
pub mod errors;
pub mod logging;
