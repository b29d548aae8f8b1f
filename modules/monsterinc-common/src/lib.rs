pub mod config;
pub mod error;
pub mod types;

pub use config::MonsterIncConfig;
pub use error::MonsterIncError;
pub use types::*;
