//! Wire format types for both sides of the proxy
//!
//! Pure serde structs; translation between them lives in `convert` and
//! `bridge`.

pub mod anthropic;
pub mod openai;
