//! HTTP API for the campaign toolkit
//!
//! Market comparison, template onboarding and meme generation over REST,
//! plus static mounts for rendered memes and template images.

pub mod routes;
pub mod server;

pub use server::{create_app, AppState};
