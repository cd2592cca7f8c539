pub mod appointment;
pub mod doctor;
pub mod error;
pub mod patient;
pub mod risk;

pub use appointment::*;
pub use doctor::*;
pub use patient::*;
pub use risk::*;
