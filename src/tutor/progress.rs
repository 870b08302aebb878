//! Weekly topic summary built from a user's recent questions.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::tutor::replies::html_escape;

/// Number of topics listed in the report.
pub const TOP_TOPICS: usize = 5;

pub const NO_PROGRESS: &str = "😕 No progress to show yet. Start asking questions!";
pub const NO_TOPICS: &str = "😅 Couldn't detect topics, but you're asking good questions!";

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z]{4,}\b").expect("word pattern is valid"));

/// Most frequent lowercase words of four or more letters.
///
/// Ties keep the order in which words were first seen.
pub fn top_keywords<S: AsRef<str>>(questions: &[S], limit: usize) -> Vec<(String, usize)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();

    for question in questions {
        let lowered = question.as_ref().to_lowercase();
        for word in WORD.find_iter(&lowered) {
            match index.get(word.as_str()) {
                Some(&i) => counts[i].1 += 1,
                None => {
                    index.insert(word.as_str().to_string(), counts.len());
                    counts.push((word.as_str().to_string(), 1));
                }
            }
        }
    }

    // Stable sort preserves first-seen order among equal counts.
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(limit);
    counts
}

/// Render the `/progress` reply (Telegram HTML).
pub fn render_progress<S: AsRef<str>>(questions: &[S]) -> String {
    if questions.is_empty() {
        return NO_PROGRESS.to_string();
    }

    let top = top_keywords(questions, TOP_TOPICS);
    if top.is_empty() {
        return NO_TOPICS.to_string();
    }

    let mut msg = String::from("📊 <b>Your Study Progress (Last 7 Days)</b>\n\n");
    for (word, count) in &top {
        let plural = if *count > 1 { "s" } else { "" };
        msg.push_str(&format!(
            "• <b>{}</b> – {} question{}\n",
            html_escape(&title_case(word)),
            count,
            plural
        ));
    }
    msg.push_str("\n✅ Great work! Keep the streak alive.");
    msg
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
