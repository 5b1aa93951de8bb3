pub mod config;
pub mod decision;
pub mod uncertainty;

pub use config::{AgreementThresholds, ReviewPolicy, SignalWeights, ThresholdState};
pub use decision::{
    agreement_count, contributions, decide, ensemble_score, severity_for, Contributions,
    LocalEvidence,
};
