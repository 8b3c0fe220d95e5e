pub mod harness;
pub mod reports;
pub mod scenarios;
pub mod seeds;
pub mod tester;

pub use harness::GameTester;
pub use scenarios::{get_scenario, list_scenarios};
pub use seeds::resolve_seed_inputs;
pub use tester::*;
