//! Core library for graphdesk.
//!
//! Provides device-code authentication against the Microsoft identity
//! platform, a small request-description based client for Microsoft Graph,
//! the mail/calendar data models, and [`GraphSession`], which ties them
//! together behind the operations the command line front end exposes.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod session;

pub use config::{Config, Settings};
pub use error::{ErrorKind, SessionError};
pub use session::GraphSession;
