//! User-facing texts and formatting helpers.

use std::fmt;

use chrono::TimeZone;

use crate::tutor::history::Interaction;

pub const THINKING: &str = "🤖 Thinking...";
pub const EMPTY_QUESTION: &str = "🤔 Please send a valid question.";
pub const FETCH_FAILED: &str = "❌ Error fetching answer.";
pub const NO_PENDING_QUESTION: &str = "⚠️ No question found. Try again.";
pub const NO_HISTORY: &str = "No history found yet. Start chatting!";
pub const STORE_UNAVAILABLE: &str = "❌ Couldn't read your history right now.";
pub const DM_BLOCKED: &str = "📭 I couldn't DM you. Open a private chat with me first, then try again.";

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// History entries are sent as single HTML messages, so long texts are clipped.
const HISTORY_QUESTION_CHARS: usize = 500;
const HISTORY_REPLY_CHARS: usize = 2500;

/// Trim a private-chat message into a question, or return the notice to send instead.
pub fn direct_question(text: &str) -> Result<&str, &'static str> {
    match text.trim() {
        "" => Err(EMPTY_QUESTION),
        question => Ok(question),
    }
}

pub fn greeting(first_name: &str) -> String {
    format!("Hi {first_name}! 👋 I’m your study buddy. Ask me any academic question!")
}

pub fn direct_answer(answer: &str) -> String {
    format!("📬 Answer:\n\n{answer}")
}

pub fn group_answer(answer: &str) -> String {
    format!("📢 Answer:\n{answer}")
}

pub fn dm_answer(answer: &str) -> String {
    format!("📬 Here's your answer:\n\n{answer}")
}

/// Escape text for Telegram's HTML parse mode.
pub fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            _ => result.push(c),
        }
    }
    result
}

/// One `/history` message (Telegram HTML), with the time shown in `tz`.
pub fn history_entry<Tz>(interaction: &Interaction, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!(
        "🕓 <b>{}</b>\n👤 You: {}\n🤖 Bot: {}",
        interaction.timestamp.with_timezone(tz).format("%H:%M"),
        html_escape(&clip(&interaction.user_message, HISTORY_QUESTION_CHARS)),
        html_escape(&clip(&interaction.bot_reply, HISTORY_REPLY_CHARS))
    )
}

fn clip(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}…", &s[..end]),
        None => s.to_string(),
    }
}

/// Split `text` into pieces Telegram will accept, preferring line breaks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut rest = text;
    while rest.chars().count() > max_chars {
        // Byte offset of the char just past the limit.
        let hard_end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let end = match rest[..hard_end].rfind('\n') {
            Some(nl) if nl > 0 => nl,
            _ => hard_end,
        };
        parts.push(rest[..end].to_string());
        rest = rest[end..].strip_prefix('\n').unwrap_or(&rest[end..]);
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}
