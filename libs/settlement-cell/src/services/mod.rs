pub mod matching;
pub mod reconciler;
pub mod signature;

pub use matching::{AmountToleranceMatch, ExactReferenceMatch, MatchOutcome, MatchStrategy};
pub use reconciler::SettlementReconciler;
