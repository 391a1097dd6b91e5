pub mod orchestrator;
pub mod record;
pub mod sink;
