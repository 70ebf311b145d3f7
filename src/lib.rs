pub mod ark;
pub mod config;
pub mod error;
pub mod flag;
pub mod logging;
pub mod output;
pub mod restore;
pub mod types;
