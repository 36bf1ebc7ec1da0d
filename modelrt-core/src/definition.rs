//! Transition table definitions.
//!
//! A table maps `(state, event)` to an optional guard, an optional action and
//! an optional next state. Tables are built once per kind and shared by every
//! instance of that kind:
//!
//! ```ignore
//! let table = TransitionTable::builder("Lamp")
//!     .initial("Off")
//!     .transition(Transition::new("Off", "Toggle").to("On"))
//!     .transition(Transition::new("On", "Toggle").to("Off").action(log_off))
//!     .build()?;
//! ```

use crate::error::{ActionResult, CoreError};
use crate::event::Payload;
use crate::machine::ActionContext;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// A state in the machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(pub String);

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for State {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for State {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for State {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Guard predicate over the owner and the event payload.
pub type Guard<O> = Arc<dyn Fn(&O, &Payload) -> bool + Send + Sync>;

/// Procedure run when a transition fires.
pub type Action<O> = Arc<dyn Fn(&ActionContext<'_, O>) -> ActionResult + Send + Sync>;

/// One table entry.
pub struct Transition<O> {
    pub from: State,
    pub event: String,
    pub to: Option<State>,
    pub(crate) guard: Option<Guard<O>>,
    pub(crate) action: Option<Action<O>>,
}

impl<O> Transition<O> {
    /// A transition on `event` out of `from` that stays in `from` and does
    /// nothing until configured further.
    pub fn new(from: impl Into<State>, event: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            event: event.into(),
            to: None,
            guard: None,
            action: None,
        }
    }

    /// Sets the next state.
    pub fn to(mut self, state: impl Into<State>) -> Self {
        self.to = Some(state.into());
        self
    }

    pub fn guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&O, &Payload) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&ActionContext<'_, O>) -> ActionResult + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn has_guard(&self) -> bool {
        self.guard.is_some()
    }

    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }
}

impl<O> fmt::Debug for Transition<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("event", &self.event)
            .field("to", &self.to)
            .field("guard", &self.guard.is_some())
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// Validated, immutable transition table.
pub struct TransitionTable<O> {
    name: String,
    initial: State,
    states: BTreeSet<State>,
    transitions: HashMap<State, HashMap<String, Transition<O>>>,
}

impl<O> TransitionTable<O> {
    pub fn builder(name: impl Into<String>) -> TableBuilder<O> {
        TableBuilder {
            name: name.into(),
            initial: None,
            states: BTreeSet::new(),
            transitions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial(&self) -> &State {
        &self.initial
    }

    /// Looks up the transition for the given state and event.
    pub fn lookup(&self, state: &str, event: &str) -> Option<&Transition<O>> {
        self.transitions.get(state)?.get(event)
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.contains(state)
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    /// Events accepted in the given state, sorted.
    pub fn events_from(&self, state: &str) -> Vec<&str> {
        let mut events: Vec<&str> = self
            .transitions
            .get(state)
            .map(|by_event| by_event.keys().map(String::as_str).collect())
            .unwrap_or_default();
        events.sort_unstable();
        events
    }

    /// Returns true if no transition leaves the given state.
    pub fn is_terminal(&self, state: &str) -> bool {
        self.transitions
            .get(state)
            .map(|by_event| by_event.is_empty())
            .unwrap_or(true)
    }

    /// Number of (state, event) entries.
    pub fn len(&self) -> usize {
        self.transitions.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<O> fmt::Debug for TransitionTable<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionTable")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("states", &self.states)
            .field("transitions", &self.len())
            .finish()
    }
}

/// Collects transitions and validates them into a [`TransitionTable`].
pub struct TableBuilder<O> {
    name: String,
    initial: Option<State>,
    states: BTreeSet<State>,
    transitions: Vec<Transition<O>>,
}

impl<O> TableBuilder<O> {
    pub fn initial(mut self, state: impl Into<State>) -> Self {
        self.initial = Some(state.into());
        self
    }

    /// Declares a state explicitly. Needed only for states that no
    /// transition mentions.
    pub fn state(mut self, state: impl Into<State>) -> Self {
        self.states.insert(state.into());
        self
    }

    pub fn transition(mut self, transition: Transition<O>) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn build(self) -> Result<TransitionTable<O>, CoreError> {
        let initial = self.initial.ok_or_else(|| CoreError::InvalidDefinition {
            reason: format!("table '{}' has no initial state", self.name),
        })?;

        let mut states = self.states;
        let mut transitions: HashMap<State, HashMap<String, Transition<O>>> = HashMap::new();

        for t in self.transitions {
            if t.event.is_empty() {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("transition out of '{}' has an empty event name", t.from),
                });
            }

            states.insert(t.from.clone());
            if let Some(to) = &t.to {
                states.insert(to.clone());
            }

            let by_event = transitions.entry(t.from.clone()).or_default();
            if by_event.contains_key(&t.event) {
                return Err(CoreError::InvalidDefinition {
                    reason: format!(
                        "duplicate transition from '{}' on event '{}'",
                        t.from, t.event
                    ),
                });
            }
            by_event.insert(t.event.clone(), t);
        }

        if !states.contains(&initial) {
            return Err(CoreError::InvalidDefinition {
                reason: format!("initial state '{}' not in states list", initial),
            });
        }

        Ok(TransitionTable {
            name: self.name,
            initial,
            states,
            transitions,
        })
    }
}
