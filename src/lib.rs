//! momentum-core
//!
//! Recurring-task scheduling and optimistic client-state reconciliation
//! for the Momentum productivity app. The canonical task collection
//! ([`store::TaskStore`]) is shared by several view consumers
//! ([`projection`]), kept consistent with the remote store under
//! debounced, cancel-and-replace writes ([`scheduler`]), with a separate
//! lifecycle for unsaved drafts ([`draft`]) and pure recurrence date
//! arithmetic ([`recurrence`]).

pub mod client;
pub mod draft;
pub mod error;
pub mod logging;
pub mod model;
pub mod projection;
pub mod recurrence;
pub mod scheduler;
pub mod store;
