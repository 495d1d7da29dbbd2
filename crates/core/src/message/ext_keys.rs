//! Reserved keys of [`Message::ext`](super::Message::ext)
//!
//! The map stays open for forward compatibility, but the run orchestrator
//! reads and writes these keys to drive control flow. `RESUME_INFO` in
//! particular must only ever appear on interrupt verbose messages: its
//! presence is what turns the next turn into a resume.

/// Total token count of the answer
pub const TOKEN: &str = "token";
pub const INPUT_TOKENS: &str = "input_tokens";
pub const OUTPUT_TOKENS: &str = "output_tokens";
/// Seconds elapsed since the run started, one decimal
pub const TIME_COST: &str = "time_cost";
/// JSON encoded bot state of the answering agent
pub const BOT_STATE: &str = "bot_state";
/// JSON encoded resume descriptor
pub const RESUME_INFO: &str = "resume_info";
pub const TOOL_CALL_IDS: &str = "tool_call_ids";
/// JSON encoded required action
pub const REQUIRES_ACTION: &str = "requires_action";
pub const PLUGIN: &str = "plugin";
pub const TOOL_NAME: &str = "tool_name";
pub const MESSAGE_TITLE: &str = "message_title";
