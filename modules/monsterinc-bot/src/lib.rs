pub mod commands;
pub mod status;
pub mod targets;

pub use commands::{BotCommand, CommandHandler};
pub use status::{scanner_status, ProcessStatus};
pub use targets::{Page, TargetFile, PAGE_SIZE};
