pub mod alternatives;
pub mod booking;
pub mod engine;
pub mod lifecycle;

pub use alternatives::nearest_alternatives;
pub use booking::ConflictResolver;
pub use engine::SchedulingEngine;
pub use lifecycle::{valid_transitions, validate_transition};
