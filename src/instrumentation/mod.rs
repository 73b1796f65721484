mod logger;

pub use logger::{DecisionLog, RunLog, RunLogger, StageLog};
