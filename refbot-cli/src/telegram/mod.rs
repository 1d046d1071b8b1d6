//! Telegram Bot API transport

pub mod client;
pub mod dispatch;
pub mod types;

pub use client::BotApi;
pub use dispatch::run_polling;
