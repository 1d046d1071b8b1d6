//! `/start` interaction
//!
//! Looks the sender up; greets known users, registers new ones with an
//! optional referrer. Failures never reach the transport: they are logged
//! and the user gets a generic apology instead.

use async_trait::async_trait;
use refbot_db::{DbError, NewUser, User, UserDao};
use tracing::{error, info, warn};

use super::referral::referrer_from_args;

pub const APOLOGY: &str =
    "Something went wrong while processing your request. Please try again later.";

/// Who sent the start command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl Sender {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

/// A start interaction: the sender plus any text after `/start`.
#[derive(Debug, Clone)]
pub struct StartCommand {
    pub from: Sender,
    pub args: Option<String>,
}

/// Which branch the interaction took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Greeted,
    Registered { referrer: Option<i64> },
    Failed,
}

/// Result of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Created(User),
    /// Another interaction registered the same identity first.
    AlreadyRegistered,
}

/// User lookup and registration.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, telegram_id: i64) -> Result<Option<User>, DbError>;
    async fn register_user(&self, user: NewUser) -> Result<Registration, DbError>;
}

#[async_trait]
impl UserDirectory for UserDao {
    async fn find_user(&self, telegram_id: i64) -> Result<Option<User>, DbError> {
        self.find_by_telegram_id(telegram_id).await
    }

    async fn register_user(&self, user: NewUser) -> Result<Registration, DbError> {
        match self.add(user).await {
            Ok(user) => Ok(Registration::Created(user)),
            Err(err) if err.is_unique_violation() => Ok(Registration::AlreadyRegistered),
            Err(err) => Err(err),
        }
    }
}

/// Sends HTML-formatted text back to the chat the command came from.
#[async_trait]
pub trait Reply: Send + Sync {
    async fn reply_html(&self, text: &str) -> anyhow::Result<()>;
}

pub async fn handle_start<D, R>(users: &D, reply: &R, command: StartCommand) -> StartOutcome
where
    D: UserDirectory + ?Sized,
    R: Reply + ?Sized,
{
    let user_id = command.from.id;
    let (outcome, text) = match respond(users, &command).await {
        Ok(done) => done,
        Err(err) => {
            error!(telegram_id = user_id, error = %err, "start command failed");
            (StartOutcome::Failed, APOLOGY.to_owned())
        }
    };

    if let Err(err) = reply.reply_html(&text).await {
        warn!(telegram_id = user_id, error = %err, "failed to send start reply");
    }
    outcome
}

async fn respond<D>(users: &D, command: &StartCommand) -> Result<(StartOutcome, String), DbError>
where
    D: UserDirectory + ?Sized,
{
    let from = &command.from;

    if users.find_user(from.id).await?.is_some() {
        info!(telegram_id = from.id, "known user started the bot");
        return Ok((StartOutcome::Greeted, greeting_text(from)));
    }

    let referrer = referrer_from_args(command.args.as_deref(), from.id);
    let registration = users
        .register_user(NewUser {
            telegram_id: from.id,
            username: from.username.clone(),
            first_name: Some(from.first_name.clone()),
            last_name: from.last_name.clone(),
            referral_id: referrer,
        })
        .await?;
    let user = match registration {
        Registration::Created(user) => user,
        Registration::AlreadyRegistered => {
            info!(telegram_id = from.id, "user registered by a concurrent start");
            return Ok((StartOutcome::Greeted, greeting_text(from)));
        }
    };
    info!(
        telegram_id = user.telegram_id,
        id = user.id,
        referrer = ?referrer,
        "registered new user"
    );

    Ok((StartOutcome::Registered { referrer }, registration_text(referrer)))
}

fn greeting_text(from: &Sender) -> String {
    format!(
        "👋 Hello, {}! Choose an action.",
        escape_html(&from.full_name())
    )
}

fn registration_text(referrer: Option<i64>) -> String {
    let linked = referrer
        .map(|id| format!(" You are now linked to the user with ID {}.", id))
        .unwrap_or_default();
    format!("🎉 <b>Thanks for registering!{}</b>", linked)
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
