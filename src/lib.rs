//! Modelgate - Cost-aware routing gateway for hosted chat-completion APIs
//!
//! This library sits in front of a hosted chat-completion API and decides,
//! per request and without invoking a model itself, whether the small or the
//! medium upstream model should serve it. Failed or degenerate small-model
//! answers are retried once on the medium model.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod router;
pub mod telemetry;
pub mod upstream;
