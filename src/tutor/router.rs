//! Group mention detection and the "where should I answer?" choice.

use std::fmt;
use std::str::FromStr;

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Where a resolved group question gets answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Reply in the chat the question was asked in.
    Group,
    /// Private message to the asker.
    Dm,
}

impl Destination {
    /// Callback data carried by the inline button.
    pub fn tag(self) -> &'static str {
        match self {
            Destination::Group => "group",
            Destination::Dm => "dm",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag(pub String);

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown destination tag '{}'", self.0)
    }
}

impl std::error::Error for UnknownTag {}

impl FromStr for Destination {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" => Ok(Destination::Group),
            "dm" => Ok(Destination::Dm),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

/// Decides whether a group message is addressed to the bot.
#[derive(Debug, Clone)]
pub struct MentionDetector {
    triggers: Vec<String>,
}

impl MentionDetector {
    /// `handle` and `alias` are matched case-insensitively as substrings.
    pub fn new(handle: &str, alias: Option<&str>) -> Self {
        let triggers = std::iter::once(handle)
            .chain(alias)
            .map(|t| t.trim().trim_start_matches('@').to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { triggers }
    }

    pub fn is_addressed(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.triggers.iter().any(|t| lowered.contains(t.as_str()))
    }
}

pub fn destination_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("📢 In Group", Destination::Group.tag()),
        InlineKeyboardButton::callback("📬 In DM", Destination::Dm.tag()),
    ]])
}

/// `@username` when the asker has one, otherwise their first name.
pub fn display_mention(username: Option<&str>, first_name: &str) -> String {
    match username {
        Some(u) => format!("@{u}"),
        None => first_name.to_string(),
    }
}

pub fn destination_prompt(mention: &str) -> String {
    format!("👋 Hey {mention}! Where should I send the answer?")
}
