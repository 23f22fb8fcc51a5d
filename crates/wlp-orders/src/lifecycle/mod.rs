//! Order lifecycle rules.

pub mod state_machine;

pub use state_machine::{can_transition, is_terminal, valid_next_states, validate_transition};
