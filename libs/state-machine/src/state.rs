//! A state machine's state.

use crate::errors::{InvalidStateError, StateMachineError};
use serde::{de::DeserializeOwned, Serialize};

/// Implementation of the state machine's state.
///
/// This trait should be implemented for an enum that expects to be used as a state within a
/// [StateMachine][crate::StateMachine] and allows defining various things like:
///
/// * Checking whether the current state is completed via [is_completed][StateMachineState::is_completed].
/// * Defining state transitions for this state via [try_next][StateMachineState::try_next].
/// * Defining the types used in this state machine to represent messages and how to handle them
///   via [handle_message][StateMachineState::handle_message].
///
/// Messages that do not belong to the current state are errors: a state machine here runs a
/// strictly ordered protocol and it's up to the state implementation to reject stale or
/// premature messages with a meaningful error.
pub trait StateMachineState
where
    Self: Sized + std::fmt::Display,
{
    /// The type that this state machine uses to address recipients in its output messages.
    ///
    /// This can be anything that the client is expected to use to represent the recipient of a message. Ultimately
    /// there will be some router component somewhere that will know how to address a node based on the contents of
    /// this type.
    type RecipientId;

    /// The input message for this state machine.
    ///
    /// This provides an abstraction over what clients should use to communicate with this state machine.
    type InputMessage: Serialize + DeserializeOwned + Clone + Send;

    /// The output message this state machine produces.
    ///
    /// Every input message that a state machine handles may generate 0+ output messages. These messages are typically
    /// used to communicate with other nodes' state machines during a state transition.
    type OutputMessage: Serialize + DeserializeOwned + Clone + Send;

    /// The type that represents the final output in this state machine.
    ///
    /// This is a single type that represents whatever can come out of this state machine once it's completed,
    /// including the output of an aborted protocol run.
    type FinalResult: Send;

    /// Check if the current state of the state machine is completed.
    ///
    /// In this context, a state is completed if it has received all of the information it needs for it to
    /// transition into the next state. For example, a state that needs 10 numbers should only return true once
    /// 10 numbers have been set in its internal state.
    fn is_completed(&self) -> bool;

    /// Try to advance the state machine.
    ///
    /// This takes the current state machine by value, which allows taking any members in the current state and
    /// forwarding them to the next one, if any, or to the [StateMachineState::FinalResult] if the state transition
    /// causes the state machine state to finish.
    fn try_next(self) -> StateMachineStateResult<Self>;

    /// Handle a message and return an output.
    ///
    /// This is where most of the logic will be, and deals with handling the messages that this state machine
    /// understands to enrich the current state, possibly advancing the state machine, and optionally returning
    /// some output.
    ///
    /// See [StateMachineStateOutput] for more information on what this function's output represents.
    fn handle_message(self, message: Self::InputMessage) -> StateMachineStateResult<Self>;
}

/// Represents the types of outputs a state machine's message handling can produce.
///
/// Because [StateMachineState::handle_message] takes the state machine by value, this method will always return
/// the state machine (unless the output is [Final][StateMachineStateOutput::Final]) along with optionally more
/// information.
///
/// Since [StateMachineState] will always be used inside a [StateMachine][crate::StateMachine] (e.g.
/// `StateMachine<MyStateMachineState>`), `StateMachine` will deal with processing this output and
/// "splitting" the returned state machine state from the rest of the information, keeping the state locally and
/// returning the information to the caller.
pub enum StateMachineStateOutput<S: StateMachineState> {
    /// The action updated the underlying states and it either didn't cause a state transition or the state that was
    /// transitioned to didn't have any output.
    Empty(S),

    /// Some underlying state transitioned and produced some output messages which should be forwarded to the
    /// message recipients.
    Messages(S, Vec<StateMachineMessage<S>>),

    /// The state machine finished and yielded this output. This is the only state that doesn't return a state
    /// machine state because that state was consumed during the state transition and no longer exists.
    Final(S::FinalResult),
}

impl<S: StateMachineState> StateMachineStateOutput<S> {
    /// Consume this output and keep only the state, returning an error if there's no state.
    pub fn into_state(self) -> Result<S, InvalidStateError> {
        use StateMachineStateOutput::*;
        match self {
            Empty(state) | Messages(state, _) => Ok(state),
            Final(_) => Err(InvalidStateError),
        }
    }

    /// Consume this output and keep only the final output, returning an error if this is not a `Final`.
    pub fn into_final(self) -> Result<S::FinalResult, InvalidStateError> {
        use StateMachineStateOutput::*;
        match self {
            Final(output) => Ok(output),
            Empty(_) | Messages(..) => Err(InvalidStateError),
        }
    }

    /// Consume this output and keep the inner state and messages, returning an error if this is not a `Messages`.
    pub fn into_messages(self) -> Result<(S, Vec<StateMachineMessage<S>>), InvalidStateError> {
        use StateMachineStateOutput::*;
        match self {
            Messages(state, messages) => Ok((state, messages)),
            Empty(_) | Final(_) => Err(InvalidStateError),
        }
    }
}

impl<S: StateMachineState> From<S> for StateMachineStateOutput<S> {
    fn from(state: S) -> Self {
        Self::Empty(state)
    }
}

/// An alias for what `handle_message` returns to simplify user code.
pub type StateMachineStateResult<S> = Result<StateMachineStateOutput<S>, StateMachineError>;

/// A recipient for a message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Recipient<T> {
    /// A single recipient.
    Single(T),

    /// Multiple recipients.
    Multiple(Vec<T>),
}

/// A message for a state machine. This is a simple wrapper over both:
///
/// * An output message that was produced by a state machine during the handling of an input message.
/// * A recipient that the message is addressed to. A router component will know how to map a recipient to
///   a node in the network.
#[derive(Clone, Debug)]
pub struct RecipientMessage<I, O> {
    recipient: Recipient<I>,
    contents: O,
}

impl<I, O> RecipientMessage<I, O> {
    /// Construct a new state machine message.
    pub fn new(recipient: Recipient<I>, contents: O) -> Self {
        Self { recipient, contents }
    }

    /// The recipient of this message.
    pub fn recipient(&self) -> &Recipient<I> {
        &self.recipient
    }

    /// The contents of this message, AKA the message itself.
    pub fn contents(&self) -> &O {
        &self.contents
    }

    /// Consumes this message and returns the contents of it.
    pub fn into_contents(self) -> O {
        self.contents
    }

    /// Consumes this message and returns the recipient and contents.
    pub fn into_parts(self) -> (Recipient<I>, O) {
        (self.recipient, self.contents)
    }
}

/// An alias that allows deriving the recipient and output message out of a state machine state.
#[allow(type_alias_bounds)]
pub type StateMachineMessage<S: StateMachineState> = RecipientMessage<S::RecipientId, S::OutputMessage>;

/// An extension trait that adds some helper functions on top of a state machine state. This is automatically
/// defined for any type that implements [StateMachineState].
pub trait StateMachineStateExt: StateMachineState {
    /// Transitions the state if it is completed. This is basically a wrapper over checking whether
    /// [StateMachineState::is_completed] is true and calling [StateMachineState::try_next] if that's the case,
    /// or returning `self` otherwise.
    fn advance_if_completed(self) -> StateMachineStateResult<Self>;
}

impl<T: StateMachineState> StateMachineStateExt for T {
    fn advance_if_completed(self) -> StateMachineStateResult<Self> {
        if self.is_completed() { self.try_next() } else { Ok(StateMachineStateOutput::Empty(self)) }
    }
}
