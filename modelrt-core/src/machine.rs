//! Per-instance state machines and the dispatch step.

use crate::bridge::Bridges;
use crate::definition::{State, TransitionTable};
use crate::engine::Runtime;
use crate::event::{Payload, PendingEvent};
use crate::instance::{Entity, InstanceRef};
use crate::registry::InstanceRegistry;
use crate::relationship::RelationshipRegistry;
use crate::timer::TimerService;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// One taken transition, as recorded in the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub from: State,
    pub event: String,
    /// `None` when the transition keeps the current state.
    pub to: Option<State>,
}

struct MachineCore {
    state: State,
    history: VecDeque<HistoryEntry>,
}

/// State machine bound to one owning instance.
///
/// The table is shared by every instance of the kind and never changes. The
/// history log is append-only; with a non-zero limit the oldest entries are
/// dropped.
pub struct StateMachine<O> {
    table: Arc<TransitionTable<O>>,
    core: RwLock<MachineCore>,
    turn: Arc<Mutex<()>>,
    history_limit: usize,
}

impl<O> StateMachine<O> {
    /// Creates a machine in the table's initial state.
    pub fn new(table: Arc<TransitionTable<O>>) -> Self {
        let state = table.initial().clone();
        Self {
            table,
            core: RwLock::new(MachineCore {
                state,
                history: VecDeque::new(),
            }),
            turn: Arc::new(Mutex::new(())),
            history_limit: 0,
        }
    }

    /// Keeps at most `limit` history entries (0 = unbounded).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn current_state(&self) -> State {
        self.core.read().state.clone()
    }

    /// Copy of the transition history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.core.read().history.iter().cloned().collect()
    }

    pub fn table(&self) -> &TransitionTable<O> {
        &self.table
    }

    /// Records the transition and moves to `to`, in one step.
    fn commit(&self, from: &State, event: &str, to: Option<State>) {
        let mut core = self.core.write();
        core.history.push_back(HistoryEntry {
            from: from.clone(),
            event: event.to_string(),
            to: to.clone(),
        });
        if self.history_limit > 0 {
            while core.history.len() > self.history_limit {
                core.history.pop_front();
            }
        }
        if let Some(to) = to {
            core.state = to;
        }
    }
}

/// An entity that drives its behavior through a bound state machine.
pub trait StateMachineOwner: Entity + Sized {
    fn state_machine(&self) -> &StateMachine<Self>;

    /// Delivers an event to this instance through the runtime.
    fn dispatch_event(&self, runtime: &Runtime, event: &str, payload: Payload) -> bool {
        runtime.dispatch(self.handle(), event, payload)
    }
}

/// Everything a transition action may touch.
pub struct ActionContext<'a, O> {
    owner: &'a O,
    event: &'a str,
    payload: &'a Payload,
    runtime: &'a Runtime,
}

impl<'a, O: StateMachineOwner> ActionContext<'a, O> {
    pub fn owner(&self) -> &'a O {
        self.owner
    }

    pub fn handle(&self) -> &'a InstanceRef {
        self.owner.handle()
    }

    /// Name of the event that fired this transition.
    pub fn event(&self) -> &'a str {
        self.event
    }

    pub fn payload(&self) -> &'a Payload {
        self.payload
    }

    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    pub fn instances(&self) -> &'a InstanceRegistry {
        self.runtime.instances()
    }

    pub fn relationships(&self) -> &'a RelationshipRegistry {
        self.runtime.relationships()
    }

    pub fn timers(&self) -> &'a TimerService {
        self.runtime.timers()
    }

    pub fn bridges(&self) -> &'a Bridges {
        self.runtime.bridges()
    }

    /// The owner's state. Already the transition's next state.
    pub fn state(&self) -> State {
        self.owner.state_machine().current_state()
    }

    /// Queues an event to the owner, processed after this action returns.
    pub fn generate(&self, event: &str, payload: Payload) {
        self.generate_to(self.handle(), event, payload);
    }

    /// Queues an event to another instance on the running turn.
    pub fn generate_to(&self, target: &InstanceRef, event: &str, payload: Payload) {
        self.runtime
            .enqueue(PendingEvent::new(target.clone(), event, payload));
    }

    /// First instance related to the owner across `rel`, downcast to `T`.
    pub fn select_one_related_as<T: Entity>(&self, rel: &str) -> Option<Arc<T>> {
        self.runtime.select_one_related_as::<T>(rel, self.handle())
    }
}

/// Type-erased view of a bound state machine, used by the runtime.
pub(crate) trait Dispatch: Send + Sync {
    fn turn_lock(&self) -> Arc<Mutex<()>>;

    fn current_state(&self) -> State;

    fn history(&self) -> Vec<HistoryEntry>;

    /// Processes one event. The caller holds the turn lock.
    fn step(&self, runtime: &Runtime, event: &str, payload: &Payload) -> bool;
}

impl<O: StateMachineOwner> Dispatch for O {
    fn turn_lock(&self) -> Arc<Mutex<()>> {
        self.state_machine().turn.clone()
    }

    fn current_state(&self) -> State {
        self.state_machine().current_state()
    }

    fn history(&self) -> Vec<HistoryEntry> {
        self.state_machine().history()
    }

    fn step(&self, runtime: &Runtime, event: &str, payload: &Payload) -> bool {
        let machine = self.state_machine();
        let handle = self.handle();
        let prior = machine.current_state();

        let Some(transition) = machine.table().lookup(prior.as_str(), event) else {
            tracing::debug!("{} ignored event {} in state {}", handle, event, prior);
            return false;
        };

        if let Some(guard) = &transition.guard {
            match panic::catch_unwind(AssertUnwindSafe(|| guard(self, payload))) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("{} guard rejected {} in state {}", handle, event, prior);
                    return false;
                }
                Err(panic) => {
                    tracing::error!(
                        "{} guard panicked on {} in state {}: {}",
                        handle,
                        event,
                        prior,
                        panic_message(&*panic)
                    );
                    return false;
                }
            }
        }

        machine.commit(&prior, event, transition.to.clone());
        tracing::info!(
            "{} transition: {} -> {} via {}",
            handle,
            prior,
            transition.to.as_ref().unwrap_or(&prior),
            event
        );

        if let Some(action) = &transition.action {
            let ctx = ActionContext {
                owner: self,
                event,
                payload,
                runtime,
            };
            match panic::catch_unwind(AssertUnwindSafe(|| action(&ctx))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        "{} action failed on {} [{}]: {}",
                        handle,
                        event,
                        e.error_code(),
                        e
                    );
                }
                Err(panic) => {
                    tracing::error!(
                        "{} action panicked on {}: {}",
                        handle,
                        event,
                        panic_message(&*panic)
                    );
                }
            }
        }

        true
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
