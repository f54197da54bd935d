//! Prediction and reconciliation core

pub mod input_log;
pub mod latency;
pub mod motion;
pub mod queue;
pub mod reconcile;
pub mod scheduler;
pub mod session;
pub mod view;

pub use scheduler::SessionHandle;
pub use session::{ClientSession, SessionReport, SessionSettings};
pub use view::LogRenderer;
