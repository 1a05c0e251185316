//! Conversion between the Messages API and the chat-completions wire format
//!
//! `request` handles the inbound direction, `response` the single-shot
//! reply. Streamed replies go through [`crate::bridge`], which reuses the
//! finish-reason and usage mapping defined here.

pub mod request;
pub mod response;

pub use request::{TranscodeOptions, translate_request};
pub use response::{map_finish_reason, map_usage, new_message_id, translate_response};
