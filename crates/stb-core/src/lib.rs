//! Core domain + application logic for the support bot.
//!
//! This crate is intentionally framework-agnostic. Telegram (and any future
//! messenger) lives behind the `MessagingPort` trait implemented in adapter
//! crates; persistence lives behind the `TicketStore` / `UserDirectory` ports.

pub mod broadcast;
pub mod claim;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod intake;
pub mod logging;
pub mod messaging;
pub mod reporting;
pub mod sessions;
pub mod store;

pub use errors::{Error, Result};
