pub mod config;
mod error;
pub mod handler;
pub mod run;
pub mod state;

pub use error::{BotErr, Result};
