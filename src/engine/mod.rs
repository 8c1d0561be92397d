pub mod controller;
pub mod phase;
pub mod state;

pub use controller::WakeEngine;
pub use phase::WakePhase;
pub use state::{WakeSnapshot, WakeState};
