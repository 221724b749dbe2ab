pub mod config;
pub mod executor;
pub mod gate;
pub mod host;
pub mod job;
pub mod roop;
pub mod stage;

#[cfg(test)]
pub mod testing;
