//! This module provides [ContributionJar], a type that collects one item from
//! every member of a fixed roster of participants.

use crate::ParticipantId;
use thiserror::Error;

/// An error while adding a contribution to a jar.
#[derive(Error, Debug)]
pub enum ContributionError {
    /// The participant already provided its contribution.
    #[error("participant {0} already contributed")]
    Duplicate(ParticipantId),

    /// The contributor is not part of the expected roster.
    #[error("participant {0} is not part of this exchange")]
    UnknownParticipant(ParticipantId),
}

/// A jar where every expected participant puts one element.
///
/// Unlike a plain counter, the jar is built from the roster it expects and
/// rejects contributions from anyone outside it.
#[derive(Debug, Clone)]
pub struct ContributionJar<T> {
    expected: Vec<ParticipantId>,
    elements: Vec<(ParticipantId, T)>,
}

impl<T> ContributionJar<T> {
    /// Constructs a new jar expecting one contribution from each given participant.
    pub fn new(expected: Vec<ParticipantId>) -> Self {
        let elements = Vec::with_capacity(expected.len());
        Self { expected, elements }
    }

    /// Check whether this jar is full.
    ///
    /// A jar becomes full when every expected participant has contributed.
    pub fn is_full(&self) -> bool {
        self.elements.len() == self.expected.len()
    }

    /// Check whether this jar is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Add a contribution from a participant.
    ///
    /// This returns an error if the participant is not expected or has
    /// already contributed.
    pub fn add(&mut self, participant: ParticipantId, element: T) -> Result<(), ContributionError> {
        if !self.expected.contains(&participant) {
            return Err(ContributionError::UnknownParticipant(participant));
        }
        let result = self.elements.binary_search_by(|element| element.0.cmp(&participant));
        match result {
            Ok(_) => Err(ContributionError::Duplicate(participant)),
            Err(index) => {
                self.elements.insert(index, (participant, element));
                Ok(())
            }
        }
    }

    /// Consume this jar and take the contributions.
    ///
    /// The returned elements *are guaranteed to be sorted by participant id*.
    pub fn into_elements(self) -> impl Iterator<Item = (ParticipantId, T)> {
        self.elements.into_iter()
    }
}
