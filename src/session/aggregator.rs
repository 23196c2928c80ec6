use thiserror::Error;

use crate::capture::{FrameSource, SourceError};
use crate::classifier::Classifier;

use super::accumulator::{SessionAccumulator, SessionSummary, StopReason};
use super::category::CategorySet;
use super::frame_result::FrameResult;
use super::termination::{CancellationSignal, Clock, SystemClock, TerminationPolicy};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),
}

/// Sees every classified frame. Purely observational: it has no access to
/// the accumulator and its return value is ignored.
pub trait FrameObserver<F> {
    fn on_frame(&mut self, frame: &F, dominant: Option<&str>);
}

/// One aggregation run over a frame source.
pub struct Session<'a, F> {
    categories: &'a CategorySet,
    policy: TerminationPolicy,
    cancel: Option<&'a dyn CancellationSignal>,
    observer: Option<&'a mut dyn FrameObserver<F>>,
    clock: &'a dyn Clock,
}

impl<'a, F> Session<'a, F> {
    pub fn new(categories: &'a CategorySet, policy: TerminationPolicy) -> Self {
        Self {
            categories,
            policy,
            cancel: None,
            observer: None,
            clock: &SystemClock,
        }
    }

    pub fn with_cancellation(mut self, cancel: &'a dyn CancellationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_observer(mut self, observer: &'a mut dyn FrameObserver<F>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Opens the source and aggregates until a stop condition is observed.
    ///
    /// Only a source that fails to open is an error. Per-frame classifier
    /// failures are counted in the summary and the session carries on.
    pub fn run<S, C>(
        self,
        open: impl FnOnce() -> Result<S, SourceError>,
        classifier: &mut C,
    ) -> Result<SessionSummary, SessionError>
    where
        S: FrameSource<Frame = F>,
        C: Classifier<F> + ?Sized,
    {
        let mut source = open().map_err(|e| {
            tracing::error!(error = %e, "failed to open frame source");
            SessionError::SourceUnavailable(e)
        })?;

        let Session {
            categories,
            policy,
            cancel,
            mut observer,
            clock,
        } = self;

        let started = clock.now();
        let mut accumulator = SessionAccumulator::new(categories);
        tracing::info!(policy = ?policy, "session started");

        let stop_reason = loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::SourceExhausted,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        frames = accumulator.frames_seen(),
                        "frame read failed, treating as end of stream"
                    );
                    break StopReason::SourceExhausted;
                }
            };
            let frame_no = accumulator.frames_seen() + 1;

            let result = FrameResult::from_inference(classifier.infer(&frame));
            match &result {
                FrameResult::Scored(scores) => {
                    tracing::trace!(frame = frame_no, scores = ?scores, "frame scored");
                }
                FrameResult::NoSubject => {
                    tracing::debug!(frame = frame_no, "no subject detected");
                }
                FrameResult::ClassifierError { message } => {
                    tracing::warn!(frame = frame_no, error = %message, "classifier failed on frame");
                }
            }
            accumulator.fold(&result);

            if let Some(observer) = observer.as_mut() {
                observer.on_frame(&frame, result.dominant(categories));
            }

            let cancelled = cancel.map(|c| c.is_cancelled()).unwrap_or(false);
            let elapsed = clock.now().saturating_duration_since(started);
            if let Some(reason) = policy.check(elapsed, cancelled) {
                break reason;
            }
        };
        drop(source);

        let mut summary = accumulator.finish(stop_reason);
        summary.elapsed_secs = clock
            .now()
            .saturating_duration_since(started)
            .as_secs_f64();

        tracing::info!(
            stop_reason = ?summary.stop_reason,
            frames = summary.frames_seen,
            scored = summary.scored_frame_count,
            no_subject = summary.no_subject_count,
            errors = summary.error_count,
            dominant = ?summary.final_dominant,
            "session finished"
        );

        Ok(summary)
    }
}

/// Runs one session with the system clock and no observer.
pub fn run_session<F, S, C>(
    open: impl FnOnce() -> Result<S, SourceError>,
    classifier: &mut C,
    categories: &CategorySet,
    policy: TerminationPolicy,
    cancel: Option<&dyn CancellationSignal>,
) -> Result<SessionSummary, SessionError>
where
    S: FrameSource<Frame = F>,
    C: Classifier<F> + ?Sized,
{
    let session = Session::new(categories, policy);
    match cancel {
        Some(cancel) => session.with_cancellation(cancel).run(open, classifier),
        None => session.run(open, classifier),
    }
}
