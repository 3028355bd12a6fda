//! # cosync-client — Console Sync Client
//!
//! Connects to a cosync relay, keeps an in-memory catalog replica in
//! step with everyone else on it, prints chat and presence changes to
//! the terminal, and turns typed lines into chat or local catalog
//! changes.

pub mod config;
pub mod console;
