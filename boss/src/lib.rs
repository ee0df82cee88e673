pub mod broadcast;
pub mod config;
mod error;
pub mod persist;
pub mod server;
pub mod state;

pub use error::{BossErr, Result};
