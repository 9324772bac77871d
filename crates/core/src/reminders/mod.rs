pub mod engine;
pub mod levels;

pub use engine::{
    DeliveryRollback, EscalationEngine, EscalationOutcome, LevelTransition, Trigger, DEFAULT_STOP_REASON,
    PAYMENT_RECEIVED_REASON,
};
