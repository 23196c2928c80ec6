mod evaluation;
mod history;
mod summary_log;

pub use evaluation::{Evaluation, GroundTruth};
pub use history::DominantTally;
pub use summary_log::{SessionRecord, StorageError, SummaryLog, SummarySink};
