//! # kernelbridge-wire: Jupyter messaging wire format
//!
//! This crate defines the messages exchanged with an interactive kernel and
//! their multipart encoding:
//! - Message envelope ([`Message`], [`Header`])
//! - Correlation identifiers ([`RequestId`], [`RequestCounter`])
//! - Frame signing ([`Signer`], HMAC-SHA256)
//! - Typed content for the message kinds the bridge speaks ([`content`])
//!
//! ## Frame Layout
//!
//! ```text
//! ┌────────────┬───────────┬───────────┬────────┬────────┬──────────┬─────────┬─────────┐
//! │ identities │ <IDS|MSG> │ signature │ header │ parent │ metadata │ content │ buffers │
//! │  (0..n)    │           │ (hex)     │ (json) │ (json) │ (json)   │ (json)  │ (0..n)  │
//! └────────────┴───────────┴───────────┴────────┴────────┴──────────┴─────────┴─────────┘
//! ```
//!
//! The signature covers the four JSON frames in order. An empty key disables
//! signing and the signature frame is sent empty.

pub mod content;
mod error;
mod header;
mod message;
mod signer;

pub use error::{WireError, WireResult};
pub use header::{Header, MsgKind, PROTOCOL_VERSION, RequestCounter, RequestId};
pub use message::{DELIMITER, Message};
pub use signer::Signer;
