//! Question intake bot: collects questions from a Telegram chat into a file
//! or a Google spreadsheet, replying in Russian or Estonian.

pub mod config;
pub mod intake;
pub mod report;
pub mod store;
pub mod telegram;
pub mod telegram_log;
