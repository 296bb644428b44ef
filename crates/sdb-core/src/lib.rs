//! Core domain + application logic for the Spotify downloader bot.
//!
//! This crate is framework-agnostic. Telegram and the `spotdl` CLI live behind
//! ports (traits) implemented in adapter crates.

pub mod app;
pub mod archive;
pub mod audit;
pub mod config;
pub mod domain;
pub mod download;
pub mod errors;
pub mod format;
pub mod logging;
pub mod messaging;
pub mod pending;
pub mod security;
pub mod spotify;

pub use errors::{Error, Result};
