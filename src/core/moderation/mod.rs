// Core moderation module - the abuse-rate detection engine.
// Following the same hexagonal pattern as the rest of core: pure domain
// logic, external collaborators behind traits.

pub mod moderation_models;
pub mod moderation_service;
pub mod tracker;

pub use moderation_models::*;
pub use moderation_service::*;
pub use tracker::{TrackedWindow, TrackerTable, WindowKey};
