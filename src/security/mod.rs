pub mod audit;
pub mod gate;
pub mod headers;
pub mod ip_tables;
pub mod rate_limiter;

pub use gate::{GateAction, GateDecision, SecurityGate};
