//! Resumable voice-call sessions and their completion log.

pub mod domain;
pub mod manager;
pub mod repository;
pub mod router;

pub use domain::{
    CallRecord, CallSession, ConversationStep, SessionDelta, SessionId, SessionOutcome,
};
pub use manager::{SessionConfig, SessionError, SessionManager, SessionView};
pub use repository::{CallLogStore, InMemoryCallLog};
pub use router::{call_router, CallServices};
