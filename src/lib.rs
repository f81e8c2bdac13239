// Library crate exposing modules for integration tests

pub mod config;
pub mod history;
pub mod repository;
pub mod state;
pub mod util;
