//! linkgate: two-phase gated-link redemption for chat-platform mini-apps.
//!
//! A destination (chat invite or external URL) is released only after the
//! client completes a signed, origin-bound handshake: a `first` token
//! records eligibility, a `final` token resolves the destination. Session
//! payloads are authenticated with the platform's keyed-hash scheme, and
//! all coordination state lives in the durable store.

pub mod bot;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod initdata;
pub mod store;
pub mod token;

pub use config::Config;
pub use error::{Error, Result};
