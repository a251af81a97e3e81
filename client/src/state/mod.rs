//! Reconciliation state owned by one conversation view.
//!
//! DESIGN
//! ======
//! Split by concern so each piece can be tested without a network:
//! `transcript` holds the ordered message list, `tools` derives the
//! invocation/result pairing from it, and `activity` tracks whether the agent
//! is working.

pub mod activity;
pub mod tools;
pub mod transcript;
