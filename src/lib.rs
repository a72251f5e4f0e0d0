pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod kanban_board;
pub mod kv;
pub mod server;
pub mod sync;
pub mod task;
pub mod ui;

pub use error::{Error, Result};
