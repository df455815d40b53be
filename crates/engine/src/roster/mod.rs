mod controller;
mod manager;

pub use controller::{
    CharacterController, MoveError, MoveOutcome, MoveTicket, MovementTuning,
    DEFAULT_MAX_STEP_SECONDS,
};
pub use manager::{RosterConfig, RosterDeps, RosterManager, RosterState, DEFAULT_LOAD_TIMEOUT};
