//! Entity status workflow engine.
//!
//! Entities of configurable types move through declared statuses by firing
//! actions. Each action is checked against a rule table (roles, required
//! fields, preconditions, terminal lock) and committed together with an
//! append-only audit record.

mod actions;
mod builtin;
mod definition;
mod engine;
mod error;
mod notify;
mod payload;
mod predicate;
mod validator;

pub use actions::{compute_available_actions, AvailableAction, BlockedReason};
pub use builtin::{practice_workflow, practice_workflow_json};
pub use definition::{
    DefinitionError, EntityType, FromStatus, TransitionRule, Workflow, WorkflowDefinition,
    ANY_STATUS,
};
pub use engine::{EntityPatch, TransitionOutcome, WorkflowEngine, MAX_COMMIT_ATTEMPTS};
pub use error::EngineError;
pub use notify::{
    ChannelNotifier, NoopNotifier, Notification, Notifier, NotifyError, TracingNotifier,
};
pub use payload::{is_present, merge_patch, missing_fields, Payload};
pub use predicate::{compare_values, eval_predicate, CompareOp, Operand, Predicate, PredicateError};
pub use validator::{validate_transition, Actor, TransitionRequest, ValidatedTransition};

pub use praxis_storage as storage;
