//! Study-buddy Telegram bot: answers questions through an LLM and keeps a
//! per-user log for `/history` and `/progress`.

pub mod config;
pub mod groq;
pub mod tutor;
