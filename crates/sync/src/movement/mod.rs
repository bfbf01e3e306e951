mod model;
mod validator;

pub use model::{MovementConfig, MovementModel};
pub use validator::{Decision, MovementValidator, RejectReason, ValidatorConfig, ValidatorStats};
