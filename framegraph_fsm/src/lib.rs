//! A generic, table-driven state machine.
//!
//! A machine is programmed first (states, inputs, transitions, initial state), then frozen with
//! [`StateMachine::set_ready_to_run`]. From then on the owner pushes inputs and drains them with
//! [`process_inputs`]. Each input is looked up against the current state, the bound action is
//! performed by the owner, and the machine moves to the next state.
//!
//! Actions are plain values (usually a domain enum) that the owner matches on. An action may push
//! more inputs into its own machine: they are handled by the same drain loop, never by recursion.
//!
//! ```
//! use framegraph_fsm::{process_inputs, StateMachine, StateMachineOwner};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum State { Locked, Unlocked }
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Input { Coin, Push }
//! #[derive(Debug, Clone, Copy)]
//! enum Action { Unlock, Lock, Refuse }
//!
//! struct Turnstile {
//!     machine: StateMachine<State, Input, Action>,
//!     passages: u32,
//! }
//!
//! impl StateMachineOwner for Turnstile {
//!     type State = State;
//!     type Input = Input;
//!     type Action = Action;
//!
//!     fn state_machine(&mut self) -> &mut StateMachine<State, Input, Action> {
//!         &mut self.machine
//!     }
//!
//!     fn perform(&mut self, action: Action) {
//!         if let Action::Lock = action {
//!             self.passages += 1;
//!         }
//!     }
//! }
//!
//! let mut machine = StateMachine::new("Turnstile");
//! machine.add_state(State::Locked, "Locked").unwrap();
//! machine.add_state(State::Unlocked, "Unlocked").unwrap();
//! machine.add_input(Input::Coin, "Coin").unwrap();
//! machine.add_input(Input::Push, "Push").unwrap();
//! machine.add_transition(State::Locked, Input::Coin, State::Unlocked, Action::Unlock).unwrap();
//! machine.add_transition(State::Unlocked, Input::Push, State::Locked, Action::Lock).unwrap();
//! machine.complete_with_self_loops(Action::Refuse).unwrap();
//! machine.select_initial_state(State::Locked).unwrap();
//! machine.set_ready_to_run().unwrap();
//!
//! let mut turnstile = Turnstile { machine, passages: 0 };
//! turnstile.machine.push_input(Input::Coin).unwrap();
//! turnstile.machine.push_input(Input::Push).unwrap();
//! process_inputs(&mut turnstile);
//! assert_eq!(turnstile.passages, 1);
//! assert_eq!(turnstile.machine.current_state(), Some(State::Locked));
//! ```
pub mod error;
pub mod export;

pub use error::{StateMachineError, StateMachineResult};
pub use export::{export_dot, export_lts};

use log::{error, trace, warn};
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

/// Anything that can identify a state or an input.
pub trait Identifier: Copy + Eq + Hash + Debug {}

impl<T: Copy + Eq + Hash + Debug> Identifier for T {}

/// The reaction registered for a (state, input) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S, A> {
    pub next_state: S,
    pub action: A,
}

/// The programmed automaton.
///
/// S: state identifiers, I: input identifiers, A: actions performed by the owner.
#[derive(Debug, Clone)]
pub struct StateMachine<S: Identifier, I: Identifier, A: Copy + Debug> {
    name: String,
    /// Declaration order is kept for the exports.
    states: Vec<(S, String)>,
    inputs: Vec<(I, String)>,
    transitions: HashMap<(S, I), Transition<S, A>>,
    initial_state: Option<S>,
    current_state: Option<S>,
    queue: VecDeque<I>,
    ready_to_run: bool,
    processing: bool,
}

impl<S: Identifier, I: Identifier, A: Copy + Debug> StateMachine<S, I, A> {
    /// Creates an empty machine in programming mode.
    /// The name is only used for diagnostics and exports.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            inputs: Vec::new(),
            transitions: HashMap::new(),
            initial_state: None,
            current_state: None,
            queue: VecDeque::new(),
            ready_to_run: false,
            processing: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares a state with a human readable description.
    pub fn add_state(
        &mut self,
        state: S,
        description: impl Into<String>,
    ) -> StateMachineResult<()> {
        self.check_programming()?;
        if self.has_state(state) {
            return self.wiring_error(StateMachineError::DuplicateState(self.state_name(state)));
        }
        self.states.push((state, description.into()));
        Ok(())
    }

    /// Declares an input with a human readable description.
    pub fn add_input(
        &mut self,
        input: I,
        description: impl Into<String>,
    ) -> StateMachineResult<()> {
        self.check_programming()?;
        if self.has_input(input) {
            return self.wiring_error(StateMachineError::DuplicateInput(self.input_name(input)));
        }
        self.inputs.push((input, description.into()));
        Ok(())
    }

    /// Registers the unique reaction for (state, input).
    /// Redefining a pair is refused, the first definition stays.
    pub fn add_transition(
        &mut self,
        state: S,
        input: I,
        next_state: S,
        action: A,
    ) -> StateMachineResult<()> {
        self.check_programming()?;
        if !self.has_state(state) {
            return self.wiring_error(StateMachineError::UnknownState(format!("{state:?}")));
        }
        if !self.has_state(next_state) {
            return self.wiring_error(StateMachineError::UnknownState(format!("{next_state:?}")));
        }
        if !self.has_input(input) {
            return self.wiring_error(StateMachineError::UnknownInput(format!("{input:?}")));
        }
        if self.transitions.contains_key(&(state, input)) {
            return self.wiring_error(StateMachineError::DuplicateTransition {
                state: self.state_name(state),
                input: self.input_name(input),
            });
        }
        self.transitions
            .insert((state, input), Transition { next_state, action });
        Ok(())
    }

    /// Wires every (state, input) pair still undefined to a self loop performing `action`.
    /// This is how a machine is made total with an explicit "invalid request" reaction.
    /// Returns the number of transitions added.
    pub fn complete_with_self_loops(&mut self, action: A) -> StateMachineResult<usize> {
        self.check_programming()?;
        let missing = self.missing_transitions();
        for &(state, input) in &missing {
            self.transitions.insert(
                (state, input),
                Transition {
                    next_state: state,
                    action,
                },
            );
        }
        Ok(missing.len())
    }

    pub fn select_initial_state(&mut self, state: S) -> StateMachineResult<()> {
        self.check_programming()?;
        if !self.has_state(state) {
            return self.wiring_error(StateMachineError::UnknownState(format!("{state:?}")));
        }
        if let Some(initial) = self.initial_state {
            return self.wiring_error(StateMachineError::InitialStateAlreadySelected(
                self.state_name(initial),
            ));
        }
        self.initial_state = Some(state);
        self.current_state = Some(state);
        Ok(())
    }

    /// Freezes the programming and allows inputs to be processed.
    pub fn set_ready_to_run(&mut self) -> StateMachineResult<()> {
        self.check_programming()?;
        if self.initial_state.is_none() {
            return self.wiring_error(StateMachineError::NoInitialState);
        }
        let missing = self.missing_transitions();
        if !missing.is_empty() {
            warn!(
                "State machine '{}' runs with {} undefined (state, input) pairs: {:?}",
                self.name,
                missing.len(),
                missing
            );
        }
        self.ready_to_run = true;
        Ok(())
    }

    pub fn is_ready_to_run(&self) -> bool {
        self.ready_to_run
    }

    /// Queues an input. It is only handled by the next [`process_inputs`] drain.
    pub fn push_input(&mut self, input: I) -> StateMachineResult<()> {
        if !self.ready_to_run {
            warn!(
                "Input {:?} pushed to state machine '{}' before it was ready to run",
                input, self.name
            );
            return Err(StateMachineError::NotReadyToRun(self.name.clone()));
        }
        if !self.has_input(input) {
            warn!(
                "Undeclared input {:?} pushed to state machine '{}'",
                input, self.name
            );
            return Err(StateMachineError::UnknownInput(format!("{input:?}")));
        }
        self.queue.push_back(input);
        Ok(())
    }

    /// Pops queued inputs until one has a transition from the current state.
    /// Inputs without a reaction are reported and dropped.
    pub fn next_transition(&mut self) -> Option<(I, Transition<S, A>)> {
        let current = self.current_state?;
        while let Some(input) = self.queue.pop_front() {
            match self.transitions.get(&(current, input)) {
                Some(transition) => return Some((input, *transition)),
                None => warn!(
                    "State machine '{}' has no transition for input {} in state {}, input ignored",
                    self.name,
                    self.input_name(input),
                    self.state_name(current)
                ),
            }
        }
        None
    }

    /// Moves the machine to the state selected by a transition returned by
    /// [`Self::next_transition`].
    pub fn complete_transition(&mut self, next_state: S) {
        self.current_state = Some(next_state);
    }

    pub fn current_state(&self) -> Option<S> {
        self.current_state
    }

    pub fn initial_state(&self) -> Option<S> {
        self.initial_state
    }

    pub fn pending_inputs(&self) -> usize {
        self.queue.len()
    }

    pub fn transition(&self, state: S, input: I) -> Option<Transition<S, A>> {
        self.transitions.get(&(state, input)).copied()
    }

    /// All declared (state, input) pairs without a reaction, in declaration order.
    pub fn missing_transitions(&self) -> Vec<(S, I)> {
        self.states
            .iter()
            .flat_map(|(state, _)| self.inputs.iter().map(move |(input, _)| (*state, *input)))
            .filter(|pair| !self.transitions.contains_key(pair))
            .collect()
    }

    /// True when every declared (state, input) pair has a reaction.
    pub fn is_total(&self) -> bool {
        self.missing_transitions().is_empty()
    }

    pub fn states(&self) -> impl Iterator<Item = S> + '_ {
        self.states.iter().map(|(state, _)| *state)
    }

    pub fn inputs(&self) -> impl Iterator<Item = I> + '_ {
        self.inputs.iter().map(|(input, _)| *input)
    }

    /// Every defined transition as (state, input, transition), in declaration order.
    pub fn transitions(&self) -> Vec<(S, I, Transition<S, A>)> {
        self.states
            .iter()
            .flat_map(|(state, _)| self.inputs.iter().map(move |(input, _)| (*state, *input)))
            .filter_map(|(state, input)| {
                self.transitions
                    .get(&(state, input))
                    .map(|transition| (state, input, *transition))
            })
            .collect()
    }

    /// The description given at declaration, or the debug form of an undeclared state.
    pub fn state_name(&self, state: S) -> String {
        self.states
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, description)| description.clone())
            .unwrap_or_else(|| format!("{state:?}"))
    }

    pub fn input_name(&self, input: I) -> String {
        self.inputs
            .iter()
            .find(|(i, _)| *i == input)
            .map(|(_, description)| description.clone())
            .unwrap_or_else(|| format!("{input:?}"))
    }

    fn has_state(&self, state: S) -> bool {
        self.states.iter().any(|(s, _)| *s == state)
    }

    fn has_input(&self, input: I) -> bool {
        self.inputs.iter().any(|(i, _)| *i == input)
    }

    fn check_programming(&self) -> StateMachineResult<()> {
        if self.ready_to_run {
            return self.wiring_error(StateMachineError::AlreadyRunning(self.name.clone()));
        }
        Ok(())
    }

    fn wiring_error(&self, err: StateMachineError) -> StateMachineResult<()> {
        error!("State machine '{}' programming error: {}", self.name, err);
        Err(err)
    }
}

/// The domain object a machine belongs to. It performs the actions bound to the transitions.
pub trait StateMachineOwner {
    type State: Identifier;
    type Input: Identifier;
    type Action: Copy + Debug;

    fn state_machine(&mut self) -> &mut StateMachine<Self::State, Self::Input, Self::Action>;

    /// Executes one action. It may push further inputs into the owner's own machine.
    fn perform(&mut self, action: Self::Action);
}

/// Drains the input queue of the owner's machine.
///
/// For every input the bound action is performed, then the machine moves to the next state.
/// Inputs pushed by an action are handled by this same loop before it returns. A nested call
/// made from within an action returns immediately and leaves the work to the running loop.
pub fn process_inputs<O: StateMachineOwner + ?Sized>(owner: &mut O) {
    let machine = owner.state_machine();
    if !machine.ready_to_run {
        warn!(
            "State machine '{}' asked to process inputs before it was ready to run",
            machine.name
        );
        return;
    }
    if machine.processing {
        return;
    }
    machine.processing = true;

    while let Some((input, transition)) = owner.state_machine().next_transition() {
        let machine = owner.state_machine();
        trace!(
            "{}: {} --[{}]--> {} ({:?})",
            machine.name,
            machine.current_state.map(|s| machine.state_name(s)).unwrap_or_default(),
            machine.input_name(input),
            machine.state_name(transition.next_state),
            transition.action
        );
        owner.perform(transition.action);
        owner.state_machine().complete_transition(transition.next_state);
    }

    owner.state_machine().processing = false;
}
