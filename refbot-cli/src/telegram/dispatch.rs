//! Long-polling loop and command routing

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::client::BotApi;
use super::types::{Message, Update};
use crate::handlers::{handle_start, Reply, Sender, StartCommand, UserDirectory};

/// `/start`, `/start@SomeBot`, optionally followed by argument text.
static START_COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^/start(?:@\w+)?(?:\s+(.*))?$").expect("start command regex is valid")
});

const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Argument text of a start command, `Some(None)` when there is none,
/// or `None` when `text` is not a start command.
pub fn parse_start(text: &str) -> Option<Option<String>> {
    let caps = START_COMMAND.captures(text.trim())?;
    let args = caps
        .get(1)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
    Some(args)
}

/// Turns a message into a start command if it is one from a human sender.
pub fn start_command(message: &Message) -> Option<StartCommand> {
    let from = message.from.as_ref().filter(|u| !u.is_bot)?;
    let args = parse_start(message.text.as_deref()?)?;
    Some(StartCommand {
        from: Sender {
            id: from.id,
            username: from.username.clone(),
            first_name: from.first_name.clone(),
            last_name: from.last_name.clone(),
        },
        args,
    })
}

/// Replies into the chat a message came from.
pub struct ChatReply {
    api: BotApi,
    chat_id: i64,
}

impl ChatReply {
    pub fn new(api: BotApi, chat_id: i64) -> Self {
        Self { api, chat_id }
    }
}

#[async_trait]
impl Reply for ChatReply {
    async fn reply_html(&self, text: &str) -> anyhow::Result<()> {
        self.api
            .send_message(self.chat_id, text)
            .await
            .with_context(|| format!("sending reply to chat {}", self.chat_id))?;
        Ok(())
    }
}

/// Poll for updates until Ctrl-C, handling each update on its own task.
///
/// On shutdown, handlers still running are awaited and the last offset is
/// acknowledged so Telegram does not redeliver handled updates.
pub async fn run_polling(
    api: BotApi,
    users: Arc<dyn UserDirectory>,
    poll_timeout: Duration,
) -> anyhow::Result<()> {
    let mut offset: Option<i64> = None;
    let mut handlers = JoinSet::new();
    info!(timeout_secs = poll_timeout.as_secs(), "polling for updates");

    loop {
        let batch = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            batch = api.get_updates(offset, poll_timeout) => batch,
        };

        let updates = match batch {
            Ok(updates) => updates,
            Err(err) => {
                warn!(error = %err, retry_in_secs = RETRY_DELAY.as_secs(), "getUpdates failed");
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);
            dispatch(&api, &users, update, &mut handlers);
        }
        reap(&mut handlers);
    }

    info!(in_flight = handlers.len(), "received Ctrl-C, finishing handlers");
    drain(&mut handlers).await;

    if offset.is_some() {
        if let Err(err) = api.get_updates(offset, Duration::ZERO).await {
            warn!(error = %err, "failed to acknowledge last updates");
        }
    }
    info!("stopped");
    Ok(())
}

fn dispatch(
    api: &BotApi,
    users: &Arc<dyn UserDirectory>,
    update: Update,
    handlers: &mut JoinSet<()>,
) {
    let Some(message) = update.message else {
        return;
    };
    let Some(command) = start_command(&message) else {
        debug!(update_id = update.update_id, "ignoring update");
        return;
    };

    let reply = ChatReply::new(api.clone(), message.chat.id);
    let users = Arc::clone(users);
    handlers.spawn(async move {
        let outcome = handle_start(&*users, &reply, command).await;
        debug!(update_id = update.update_id, ?outcome, "start handled");
    });
}

/// Collect handlers that already finished.
fn reap(handlers: &mut JoinSet<()>) {
    while let Some(done) = handlers.try_join_next() {
        log_join(done);
    }
}

/// Wait for every handler still running.
async fn drain(handlers: &mut JoinSet<()>) {
    while let Some(done) = handlers.join_next().await {
        log_join(done);
    }
}

fn log_join(done: Result<(), JoinError>) {
    if let Err(err) = done {
        error!(error = %err, "start handler panicked");
    }
}
