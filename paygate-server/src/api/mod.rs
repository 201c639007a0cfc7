//! HTTP API.
//!
//! - `/callbacks` – notifications from the processing engine
//! - `/admin`     – manual webhook actions, guarded by `X-Admin-Token`

pub mod admin;
pub mod callbacks;
pub mod extractors;
