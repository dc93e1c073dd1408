pub mod queue;
pub mod runner;
