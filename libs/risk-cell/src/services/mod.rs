pub mod checkpoints;
pub mod risk;
pub mod scorer;
pub mod verifier;

pub use checkpoints::due_checkpoint;
pub use risk::RiskService;
pub use scorer::RiskScorer;
pub use verifier::{FlagVerifier, InsuranceVerifier};
