use thiserror::Error;

/// Wiring and usage errors of a [`crate::StateMachine`].
///
/// None of them alter the machine: every failing call is a no-op.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateMachineError {
    #[error("State machine '{0}' is already running, its programming is frozen")]
    AlreadyRunning(String),

    #[error("State machine '{0}' is not ready to run yet")]
    NotReadyToRun(String),

    #[error("State '{0}' is not declared")]
    UnknownState(String),

    #[error("Input '{0}' is not declared")]
    UnknownInput(String),

    #[error("State '{0}' is declared twice")]
    DuplicateState(String),

    #[error("Input '{0}' is declared twice")]
    DuplicateInput(String),

    #[error("Transition for state '{state}' and input '{input}' is already defined")]
    DuplicateTransition { state: String, input: String },

    #[error("Initial state was already selected as '{0}'")]
    InitialStateAlreadySelected(String),

    #[error("No initial state selected")]
    NoInitialState,
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
