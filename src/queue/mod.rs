//! Per-connector request queueing: items, dispatch, and throttled admission.

pub mod dispatcher;
pub mod item;

pub use dispatcher::{DispatchError, DispatchStats, Dispatcher, SubmissionHandle, UnitOfWork};
pub use item::{QueueItem, QueueState};
