use std::{collections::HashMap, sync::Mutex};

use serde::{Deserialize, Serialize};

/// Pipeline progress of a message before any post-broadcast status exists.
/// Mutated only by the stage currently holding the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconfirmedState {
    Unknown,
    Queued,
    Building,
    Sending,
    InFlight,
}

/// Shared message-id -> progress map, dropped once a terminal status is
/// dispatched.
#[derive(Default)]
pub struct MessageStates {
    inner: Mutex<HashMap<String, PreconfirmedState>>,
}

impl MessageStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, message_id: &str, state: PreconfirmedState) {
        let mut inner = self.inner.lock().expect("message state lock poisoned");
        inner.insert(message_id.to_string(), state);
    }

    pub fn set_all<'a>(
        &self,
        message_ids: impl IntoIterator<Item = &'a str>,
        state: PreconfirmedState,
    ) {
        let mut inner = self.inner.lock().expect("message state lock poisoned");
        for id in message_ids {
            inner.insert(id.to_string(), state);
        }
    }

    pub fn get(&self, message_id: &str) -> PreconfirmedState {
        let inner = self.inner.lock().expect("message state lock poisoned");
        inner
            .get(message_id)
            .copied()
            .unwrap_or(PreconfirmedState::Unknown)
    }

    pub fn remove(&self, message_id: &str) {
        let mut inner = self.inner.lock().expect("message state lock poisoned");
        inner.remove(message_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_until_set() {
        let states = MessageStates::new();
        assert_eq!(states.get("missing"), PreconfirmedState::Unknown);

        states.set("m1", PreconfirmedState::Queued);
        assert_eq!(states.get("m1"), PreconfirmedState::Queued);

        states.set_all(["m1", "m2"], PreconfirmedState::Building);
        assert_eq!(states.get("m1"), PreconfirmedState::Building);
        assert_eq!(states.get("m2"), PreconfirmedState::Building);

        states.remove("m1");
        assert_eq!(states.get("m1"), PreconfirmedState::Unknown);
    }
}
