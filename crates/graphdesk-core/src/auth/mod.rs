//! Authentication against the Microsoft identity platform.
//!
//! This module provides:
//! - `TokenCredential`: the seam the Graph client pulls bearer tokens from
//! - `DeviceCodeCredential`: interactive device-code login with in-memory
//!   token caching and refresh
//! - `TokenStore`: optional OS keychain persistence of the refresh token

pub mod credential;
pub mod device_code;
pub mod error;
pub mod token_store;

pub use credential::{AccessToken, DeviceCodeInfo, DeviceCodePrompt, TokenCredential};
pub use device_code::DeviceCodeCredential;
pub use error::AuthError;
pub use token_store::TokenStore;
