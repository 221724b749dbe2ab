pub mod progress;
pub mod registry;
pub mod runner;
pub mod slot;
