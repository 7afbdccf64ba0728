//! State machine definitions.

use crate::{
    errors::{InvalidStateError, StateMachineError, StateUnavailableError},
    state::{RecipientMessage, StateMachineState, StateMachineStateOutput},
};
use std::fmt::Formatter;

// A thin wrapper of the state. This lets us have visibility into why the state was taken to
// provide better error messages.
enum StateMachineInner<S> {
    Taken,
    State(S),
    Finalized,
}

impl<S> StateMachineInner<S> {
    fn state(&self) -> Result<&S, StateUnavailableError> {
        if let Self::State(state) = self { Ok(state) } else { Err(self.as_error()) }
    }

    fn take_state(&mut self) -> Result<S, StateUnavailableError> {
        let state = std::mem::replace(self, StateMachineInner::Taken);
        if let Self::State(state) = state { Ok(state) } else { Err(state.as_error()) }
    }

    fn as_error(&self) -> StateUnavailableError {
        let detail = match self {
            Self::Taken => "state is taken",
            Self::Finalized => "state machine reached terminal state",
            // This shouldn't happen but we don't want to make this fallible for this dummy error.
            Self::State(_) => "internal error",
        };
        StateUnavailableError(detail)
    }
}

/// Implementation of a state machine.
///
/// This is a simple wrapper over a [StateMachineState] that allows using it without having to deal with all of the
/// functions in that trait that take `self` by value.
pub struct StateMachine<S: StateMachineState> {
    inner: StateMachineInner<S>,
}

impl<S: StateMachineState> StateMachine<S> {
    /// Create a new state machine.
    pub fn new(initial_state: S) -> Self {
        StateMachine { inner: StateMachineInner::State(initial_state) }
    }

    /// Try to get an immutable reference to the current state.
    ///
    /// This will return an error if the state machine was previously consumed during a state transition. This can
    /// happen if either the state machine reached a terminal state or an unrecoverable error occurred during the
    /// state transition.
    pub fn state(&self) -> Result<&S, StateUnavailableError> {
        self.inner.state()
    }

    /// Checks whether the state machine is finished.
    pub fn is_finished(&self) -> bool {
        matches!(&self.inner, StateMachineInner::Finalized)
    }

    /// Let the underlying state handle the provided message, returning whatever output it produced.
    ///
    /// This returns a [StateMachineOutput], which is very similar to a [StateMachineStateOutput], except it doesn't
    /// have the [StateMachineState] as part of it.
    pub fn handle_message(&mut self, message: S::InputMessage) -> Result<HandleOutput<S>, StateMachineError> {
        let state = self.inner.take_state()?;
        let current_state_str = state.to_string();
        let output = state.handle_message(message)?;

        let output = self.apply_state_output(output);
        let new_state_str = self.to_string();
        if current_state_str != new_state_str {
            tracing::debug!("state transition: {current_state_str} -> {new_state_str}");
        }
        Ok(output)
    }

    fn apply_state_output(&mut self, output: StateMachineStateOutput<S>) -> HandleOutput<S> {
        match output {
            StateMachineStateOutput::Empty(state) => {
                self.inner = StateMachineInner::State(state);
                StateMachineOutput::Empty
            }
            StateMachineStateOutput::Messages(state, messages) => {
                self.inner = StateMachineInner::State(state);
                StateMachineOutput::Messages(messages)
            }
            StateMachineStateOutput::Final(output) => {
                self.inner = StateMachineInner::Finalized;
                StateMachineOutput::Final(output)
            }
        }
    }
}

impl<S: StateMachineState> std::fmt::Display for StateMachine<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "StateMachine(")?;
        match &self.inner {
            StateMachineInner::Taken => write!(f, "Taken")?,
            StateMachineInner::State(state) => write!(f, "{}", state)?,
            StateMachineInner::Finalized => write!(f, "Finalized")?,
        }
        write!(f, ")")
    }
}

/// The output of a state machine. See the documentation on [StateMachineStateOutput] as these are basically
/// the same enum variants except it doesn't contain the state machine state itself.
#[derive(Debug)]
pub enum StateMachineOutput<R, O, F> {
    /// A state machine's output messages, typically something that needs to be communicated
    /// to other participants' state machines.
    Messages(Vec<RecipientMessage<R, O>>),

    /// The final output of a state machine.
    Final(F),

    /// No output was produced.
    Empty,
}

impl<R, O, F> StateMachineOutput<R, O, F> {
    /// Convert into a final output, error otherwise.
    pub fn into_final(self) -> Result<F, InvalidStateError> {
        match self {
            Self::Final(output) => Ok(output),
            _ => Err(InvalidStateError),
        }
    }

    /// Convert into output messages, error otherwise.
    pub fn into_messages(self) -> Result<Vec<RecipientMessage<R, O>>, InvalidStateError> {
        match self {
            Self::Messages(messages) => Ok(messages),
            _ => Err(InvalidStateError),
        }
    }

    /// Convert into an empty output, error otherwise.
    pub fn into_empty(self) -> Result<(), InvalidStateError> {
        match self {
            Self::Empty => Ok(()),
            _ => Err(InvalidStateError),
        }
    }
}

/// An alias for `StateMachineOutput` based on a `StateMachineState`.
#[allow(type_alias_bounds)]
pub type HandleOutput<S: StateMachineState> = StateMachineOutput<S::RecipientId, S::OutputMessage, S::FinalResult>;
