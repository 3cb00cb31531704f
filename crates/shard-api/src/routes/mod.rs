//! # Route Modules
//!
//! | Prefix                         | Module        |
//! |--------------------------------|---------------|
//! | `/v1/artifacts/*`              | [`artifacts`] |
//! | `/v1/artifacts/{key}/sessions`, `/v1/sessions/*` | [`sessions`] |
//! | `/v1/admin/*`                  | [`admin`]     |
//! | `/health/*`, `/metrics`        | [`health`]    |

pub mod admin;
pub mod artifacts;
pub mod health;
pub mod sessions;
