//! Domain model (IDs, envelope, events, errors, decisions, records).
//!
//! ここにあるのは I/O を持たない純粋な型と関数だけです。

pub mod circular;
pub mod decision;
pub mod envelope;
pub mod errors;
pub mod event;
pub mod ids;
pub mod record;
pub mod status;

pub use circular::{CIRCULAR_MARKER, Node, remove_circular};
pub use decision::{DEFAULT_MAX_EVENT_AGE, RetryDecision, RetryPolicy, RetryReason};
pub use envelope::{Envelope, FormatError, FormatIssue};
pub use errors::{ErrorKind, EventError, Exception, RetryEvent, UnknownFailure};
pub use event::{CallableInvocation, CloudEvent, EventKind, MessagePublishedData, PubSubMessage};
pub use ids::{CorrelationId, ExecutionId, Id, IdMarker, TraceId};
pub use record::{ErrorRecord, EventMeta, OriginalError};
pub use status::{FunctionsErrorCode, HttpsError, StatusMapping};
