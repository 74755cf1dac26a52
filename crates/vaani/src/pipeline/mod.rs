//! Feature modules composing the notification pipeline.

pub mod alerts;
pub mod calls;
