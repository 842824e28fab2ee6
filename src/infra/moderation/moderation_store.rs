// Implementations of the trigger-config store port.
#![allow(unused_imports)]

pub mod in_memory;
pub mod sqlite_trigger_store;

// Re-export for convenience
pub use in_memory::InMemoryTriggerStore;
pub use sqlite_trigger_store::SqliteTriggerStore;
