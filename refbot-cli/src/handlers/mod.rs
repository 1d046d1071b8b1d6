//! Bot interaction handlers

pub mod referral;
pub mod start;

pub use start::{handle_start, Reply, Sender, StartCommand, UserDirectory};
