//! Question/answer pipeline: ask the model, log the answer, route group replies.

pub mod history;
pub mod pending;
pub mod progress;
pub mod replies;
pub mod router;


use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{error, info, warn};

use crate::groq::{self, Answerer};
use history::{HistoryStore, Interaction, StoreError};
use pending::{PendingKey, PendingQuestions};
use router::{Destination, MentionDetector};

/// Entries shown by `/history`.
pub const HISTORY_LIMIT: usize = 10;

/// Window covered by `/progress`.
pub fn progress_window() -> Duration {
    Duration::days(7)
}

/// Outcome of a destination button press.
#[derive(Debug)]
pub enum Resolution {
    /// Nothing was pending for this user in this chat.
    NoPendingQuestion,
    /// Formatted answer ready to send to `destination`.
    Deliver { destination: Destination, text: String },
    /// The model call failed; nothing was logged.
    Failed(groq::Error),
}

pub struct Tutor<A> {
    answerer: A,
    store: HistoryStore,
    pending: PendingQuestions,
    mentions: MentionDetector,
}

impl<A: Answerer> Tutor<A> {
    pub fn new(answerer: A, store: HistoryStore, mentions: MentionDetector) -> Self {
        Self {
            answerer,
            store,
            pending: PendingQuestions::new(),
            mentions,
        }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Ask the model and log the answer.
    ///
    /// A failed log write does not hide the answer from the user.
    pub async fn answer(&self, user_id: i64, question: &str) -> Result<String, groq::Error> {
        let preview: String = question.chars().take(100).collect();
        info!("❓ Question from {user_id}: \"{preview}\"");

        let answer = self.answerer.ask(question).await?;

        let interaction = Interaction {
            user_id,
            timestamp: Utc::now(),
            user_message: question.to_string(),
            bot_reply: answer.clone(),
        };
        if let Err(e) = self.store.append(&interaction) {
            error!("Failed to log answer for user {user_id}: {e}");
        }

        Ok(answer)
    }

    /// Stash an addressed group message. Returns false when the bot wasn't mentioned.
    pub fn capture_mention(&self, chat_id: i64, user_id: i64, text: &str) -> bool {
        if !self.mentions.is_addressed(text) {
            return false;
        }
        let key = PendingKey::new(chat_id, user_id);
        let replaced = self.pending.stash(key, text.to_string(), Utc::now());
        if replaced.is_some() {
            info!("Replaced pending question for user {user_id} in chat {chat_id}");
        }
        true
    }

    /// Answer the pending question for this user in this chat.
    pub async fn resolve(&self, chat_id: i64, user_id: i64, destination: Destination) -> Resolution {
        let Some(question) = self.pending.take(PendingKey::new(chat_id, user_id), Utc::now()) else {
            return Resolution::NoPendingQuestion;
        };

        match self.answer(user_id, &question).await {
            Ok(answer) => {
                let text = match destination {
                    Destination::Group => replies::group_answer(&answer),
                    Destination::Dm => replies::dm_answer(&answer),
                };
                Resolution::Deliver { destination, text }
            }
            Err(e) => {
                warn!("Completion failed for user {user_id}: {e}");
                Resolution::Failed(e)
            }
        }
    }

    /// `/progress` reply for the week ending at `now`.
    pub fn progress(&self, user_id: i64, now: DateTime<Utc>) -> Result<String, StoreError> {
        let questions = self.store.questions_since(user_id, now - progress_window())?;
        Ok(progress::render_progress(&questions))
    }

    /// `/history` replies, oldest first, with times shown in `tz`.
    pub fn history<Tz>(&self, user_id: i64, tz: &Tz) -> Result<Vec<String>, StoreError>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let mut recent = self.store.recent(user_id, HISTORY_LIMIT)?;
        if recent.is_empty() {
            return Ok(vec![replies::NO_HISTORY.to_string()]);
        }
        recent.reverse();
        Ok(recent.iter().map(|i| replies::history_entry(i, tz)).collect())
    }
}
