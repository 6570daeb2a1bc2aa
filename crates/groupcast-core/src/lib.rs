//! Core domain + application logic for the group broadcast bot.
//!
//! This crate is framework-agnostic. Telegram and the document store live
//! behind ports (traits); the Telegram adapter lives in its own crate.

pub mod broadcast;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod menu;
pub mod security;
pub mod store;

pub use errors::{Error, Result};
