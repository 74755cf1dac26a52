//! Core library for the vaani voice-alert service.
//!
//! The [`pipeline`] module carries the matching-and-delivery pipeline: typed
//! records and store contracts, the eligibility matcher, the publish fan-out
//! dispatcher, the bounded-retry delivery scheduler, and the call-session
//! state manager. [`config`], [`telemetry`], and [`error`] provide the shared
//! service plumbing used by the API binary.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;
