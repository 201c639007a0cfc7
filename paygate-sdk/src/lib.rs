//! Wire objects shared between the Paygate backend and its peers.
//!
//! - [`objects::callbacks`]: notifications posted by the blockchain-processing engine.
//! - [`objects::webhook`]: payloads delivered to merchant webhook endpoints.
//! - [`signature`]: the `X-Sign` HMAC used on every outbound webhook.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod objects;
pub mod signature;
