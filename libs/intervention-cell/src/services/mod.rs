pub mod dispatch;
pub mod policy;
pub mod tracker;

pub use dispatch::{build_dispatcher, DispatchService, LogDispatcher, NotificationDispatcher, WebhookDispatcher};
pub use policy::InterventionPolicy;
pub use tracker::{InterventionRegistry, InterventionTracker};
