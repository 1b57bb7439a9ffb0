//! Append-only history log for one orchestration instance.
use crate::{Event, INITIAL_EVENT_ID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// Event id is not exactly one past the last recorded id.
    NonMonotonic { expected: u64, actual: u64 },
    /// Event belongs to another instance.
    WrongInstance { expected: String, actual: String },
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryError::NonMonotonic { expected, actual } => {
                write!(f, "non-monotonic event id: expected {expected}, got {actual}")
            }
            HistoryError::WrongInstance { expected, actual } => {
                write!(f, "event for instance '{actual}' appended to history of '{expected}'")
            }
        }
    }
}

impl std::error::Error for HistoryError {}

/// Ordered events of one instance. Ids start at [`INITIAL_EVENT_ID`] and grow by one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLog {
    instance_id: String,
    events: Vec<Event>,
}

impl HistoryLog {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            events: Vec::new(),
        }
    }

    /// Rebuild a log from stored events, checking their ordering.
    pub fn from_events(instance_id: impl Into<String>, events: Vec<Event>) -> Result<Self, HistoryError> {
        let mut log = Self::new(instance_id);
        log.append_all(events)?;
        Ok(log)
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn last_event_id(&self) -> u64 {
        self.events.last().map(|e| e.event_id).unwrap_or(INITIAL_EVENT_ID - 1)
    }

    pub fn next_event_id(&self) -> u64 {
        self.last_event_id() + 1
    }

    pub fn append(&mut self, event: Event) -> Result<(), HistoryError> {
        self.validate(&event, self.next_event_id())?;
        self.events.push(event);
        Ok(())
    }

    /// Append a batch. Nothing is written unless every event is valid.
    pub fn append_all(&mut self, events: impl IntoIterator<Item = Event>) -> Result<(), HistoryError> {
        let events: Vec<Event> = events.into_iter().collect();
        let mut expected = self.next_event_id();
        for e in &events {
            self.validate(e, expected)?;
            expected += 1;
        }
        self.events.extend(events);
        Ok(())
    }

    fn validate(&self, event: &Event, expected: u64) -> Result<(), HistoryError> {
        if event.event_id != expected {
            return Err(HistoryError::NonMonotonic {
                expected,
                actual: event.event_id,
            });
        }
        if !self.instance_id.is_empty() && event.instance_id != self.instance_id {
            return Err(HistoryError::WrongInstance {
                expected: self.instance_id.clone(),
                actual: event.instance_id.clone(),
            });
        }
        Ok(())
    }

    pub fn read(&self) -> &[Event] {
        &self.events
    }

    pub fn to_vec(&self) -> Vec<Event> {
        self.events.clone()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        self.events.iter().any(Event::is_terminal)
    }
}
