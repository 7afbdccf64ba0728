//! Symmetric protocol simulator.
//!
//! A protocol is considered to be symmetric if all participants assume the same role within
//! the protocol. In other words, there is a single role a participant can take, which means
//! all participants are running the exact same steps to progress the protocol.
//!
//! The key exchange is symmetric: every wallet collects the same rounds of broadcasts and
//! produces its output once its own state machine converges.
//!
//! There is no networking involved in the execution of this simulator. It simply acts as a
//! basic router that takes output messages from the protocol being run and forwards them to
//! the target participant. The goal is to allow protocols to be tested by simply providing a
//! way to instantiate them.

use anyhow::{anyhow, Error};
use basic_types::{ParticipantId, ParticipantMessage};
use state_machine::{
    sm::StateMachineOutput,
    state::{Recipient, StateMachineMessage},
    StateMachine, StateMachineState,
};
use std::collections::HashMap;

/// A symmetric protocol simulator.
#[derive(Clone)]
pub struct SymmetricProtocolSimulator {
    max_rounds: usize,
}

impl SymmetricProtocolSimulator {
    /// Construct a new simulator.
    ///
    /// # Arguments
    /// - `max_rounds` - The maximum number of rounds to perform before the protocol is assumed
    ///   to be stuck in a loop.
    pub fn new(max_rounds: usize) -> Self {
        Self { max_rounds }
    }

    /// Runs the given protocol and returns the output of every participant.
    pub fn run_protocol<P, M>(&self, protocol: &P) -> Result<Vec<ParticipantOutput<P::State>>, Error>
    where
        P: Protocol,
        P::State: StateMachineState<RecipientId = ParticipantId, InputMessage = ParticipantMessage<M>, OutputMessage = M>,
        M: Clone,
    {
        let context = self.initialize_protocol(protocol)?;
        self.run_until_completion(context)
    }

    fn run_until_completion<S, M>(&self, context: ProtocolContext<S>) -> Result<Vec<ParticipantOutput<S>>, Error>
    where
        S: StateMachineState<RecipientId = ParticipantId, InputMessage = ParticipantMessage<M>, OutputMessage = M>,
        M: Clone,
    {
        let mut participant_states = context.participant_states;
        let mut next_round_messages = context.initial_messages;
        let mut round_id = 0;
        let mut outputs = Vec::new();
        let expected_outputs = participant_states.participant_count();
        loop {
            // Take this round's messages so we can collect the next round's messages separately.
            let round_messages = std::mem::take(&mut next_round_messages);
            if round_messages.is_empty() {
                return Err(anyhow!("started round {round_id} without any messages"));
            }
            for message in round_messages {
                let (sender, message) = message.into_parts();
                let (recipients, message) = message.into_parts();
                match recipients {
                    Recipient::Single(participant) => participant_states
                        .add_participant_message(participant, ParticipantMessage::new(sender, message))?,
                    Recipient::Multiple(participants) => {
                        for participant in participants {
                            participant_states.add_participant_message(
                                participant,
                                ParticipantMessage::new(sender.clone(), message.clone()),
                            )?;
                        }
                    }
                };
            }

            for (_, participant_state) in participant_states.states.iter_mut() {
                match participant_state.apply_messages()? {
                    ParticipantRoundOutput::Completed(output) => {
                        outputs.push(output);
                        if outputs.len() == expected_outputs {
                            return Ok(outputs);
                        }
                    }
                    ParticipantRoundOutput::Messages(messages) => next_round_messages.extend(messages),
                }
            }

            round_id += 1;
            if round_id >= self.max_rounds {
                return Err(anyhow!("exceeded maximum number of rounds without completing protocol"));
            }
        }
    }

    fn initialize_protocol<P: Protocol>(&self, protocol: &P) -> Result<ProtocolContext<P::State>, Error> {
        let prepare = protocol.prepare()?;
        let participants = protocol.participants(&prepare);

        let mut context = ProtocolContext::default();
        for participant in &participants {
            let InitializedProtocol { state, initial_messages } = protocol
                .initialize(participant.clone(), &prepare)
                .map_err(|e| anyhow!("failed to initialize protocol: {e}"))?;
            context.participant_states.add_participant(participant.clone(), state);
            let initial_messages =
                initial_messages.into_iter().map(|message| ParticipantMessage::new(participant.clone(), message));
            context.initial_messages.extend(initial_messages);
        }
        Ok(context)
    }
}

enum ParticipantRoundOutput<S: StateMachineState> {
    Completed(ParticipantOutput<S>),
    Messages(Vec<ParticipantMessage<StateMachineMessage<S>>>),
}

struct ParticipantState<S: StateMachineState> {
    participant_id: ParticipantId,
    state_machine: StateMachine<S>,
    input_messages: Vec<S::InputMessage>,
}

impl<S: StateMachineState> ParticipantState<S> {
    fn new(participant_id: ParticipantId, state: S) -> Self {
        Self { participant_id, state_machine: StateMachine::new(state), input_messages: Vec::new() }
    }

    fn apply_messages(&mut self) -> Result<ParticipantRoundOutput<S>, Error> {
        let mut next_round_messages = Vec::new();
        for message in std::mem::take(&mut self.input_messages) {
            match self.state_machine.handle_message(message) {
                Ok(StateMachineOutput::Final(output)) => {
                    return Ok(ParticipantRoundOutput::Completed(ParticipantOutput::new(
                        self.participant_id.clone(),
                        output,
                    )));
                }
                Ok(StateMachineOutput::Messages(messages)) => {
                    let messages =
                        messages.into_iter().map(|message| ParticipantMessage::new(self.participant_id.clone(), message));
                    next_round_messages.extend(messages)
                }
                Ok(StateMachineOutput::Empty) => (),
                Err(e) => return Err(anyhow!("failed to handle message: {e}")),
            }
        }
        Ok(ParticipantRoundOutput::Messages(next_round_messages))
    }
}

struct ParticipantStates<S: StateMachineState> {
    states: HashMap<ParticipantId, ParticipantState<S>>,
}

impl<S: StateMachineState> ParticipantStates<S> {
    fn add_participant(&mut self, participant_id: ParticipantId, state: S) {
        self.states.insert(participant_id.clone(), ParticipantState::new(participant_id, state));
    }

    fn add_participant_message(&mut self, participant_id: ParticipantId, message: S::InputMessage) -> Result<(), Error> {
        let participant_state = self
            .states
            .get_mut(&participant_id)
            .ok_or_else(|| anyhow!("state for participant {participant_id:?} not found"))?;
        participant_state.input_messages.push(message);
        Ok(())
    }

    fn participant_count(&self) -> usize {
        self.states.len()
    }
}

struct ProtocolContext<S: StateMachineState> {
    participant_states: ParticipantStates<S>,
    initial_messages: Vec<ParticipantMessage<StateMachineMessage<S>>>,
}

impl<S: StateMachineState> Default for ProtocolContext<S> {
    fn default() -> Self {
        Self { participant_states: ParticipantStates { states: HashMap::new() }, initial_messages: Vec::new() }
    }
}

/// The final output for the instance of the protocol being run by a particular participant.
pub struct ParticipantOutput<S: StateMachineState> {
    /// The participant id.
    pub participant_id: ParticipantId,

    /// The output itself.
    pub output: S::FinalResult,
}

impl<S: StateMachineState> ParticipantOutput<S> {
    /// Construct a new `ParticipantOutput`.
    pub fn new(participant_id: ParticipantId, output: S::FinalResult) -> Self {
        Self { participant_id, output }
    }
}

/// A protocol abstraction.
///
/// The main concept being abstracted is the initialization of the protocol. Once a protocol is
/// initialized and we have the initial set of messages that it generates, it should be able to
/// run on its own by feeding messages into the instance of the protocol being run by each
/// participant until its completion.
pub trait Protocol {
    /// The protocol state to be instantiated.
    type State: StateMachineState<RecipientId = ParticipantId>;

    /// The output of the prepare step.
    ///
    /// This is a customization point for protocols whose initialization is tied to shared
    /// setup data. The key exchange, for example, generates every wallet's keys and round 1
    /// announcements here so each instance can be initialized with its peers' infos.
    type PrepareOutput;

    /// Prepare the execution of the protocol.
    ///
    /// The output of this function will be fed to [`initialize`][Protocol::initialize] along
    /// with each participant identity reported by [`participants`][Protocol::participants].
    fn prepare(&self) -> Result<Self::PrepareOutput, Error>;

    /// The participant identities taking part in this execution.
    ///
    /// Identities come out of the prepared data rather than the simulator because protocols
    /// here address participants by content derived identifiers the simulator cannot invent.
    fn participants(&self, prepare_output: &Self::PrepareOutput) -> Vec<ParticipantId>;

    /// Initialize a protocol instance for a particular participant.
    ///
    /// This should instantiate the state machine for this protocol and include all of the
    /// initialization messages that it generates as part of it.
    fn initialize(
        &self,
        participant: ParticipantId,
        prepare_output: &Self::PrepareOutput,
    ) -> Result<InitializedProtocol<Self::State>, Error>;
}

/// An initialized protocol, along with the messages it produced during initialization.
pub struct InitializedProtocol<S: StateMachineState> {
    /// The protocol's state.
    pub state: S,

    /// The initial set of messages the protocol generated.
    pub initial_messages: Vec<StateMachineMessage<S>>,
}

impl<S: StateMachineState> InitializedProtocol<S> {
    /// Constructs a new initialized protocol.
    pub fn new(state: S, initial_messages: Vec<StateMachineMessage<S>>) -> Self {
        Self { state, initial_messages }
    }
}
