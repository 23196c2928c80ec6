mod accumulator;
mod aggregator;
mod category;
mod frame_result;
mod termination;

pub use accumulator::{SessionSummary, StopReason};
pub use aggregator::{run_session, FrameObserver, Session, SessionError};
pub use category::{CategorySet, Probabilities};
pub use frame_result::FrameResult;
pub use termination::{CancellationSignal, Clock, TerminationPolicy};
