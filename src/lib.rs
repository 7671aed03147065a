// Public API for the console driver and integration tests

pub mod config;
pub mod dictionary;
pub mod referee;
pub mod state;
pub mod store;
pub mod text;
pub mod types;
