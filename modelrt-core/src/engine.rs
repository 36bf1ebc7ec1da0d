//! Runtime context - coordinates registries, state machines, timers and
//! bridges, and runs dispatch turns.
//!
//! A dispatch turn owns a FIFO queue of pending events. The event passed to
//! [`Runtime::dispatch`] is processed first; every event generated while the
//! turn runs (by actions, or by re-entrant `dispatch` calls from actions) is
//! appended to the queue and processed after the current action returns, in
//! generation order. The queue lives in a thread-local slot so nested calls
//! never grow the stack.
//!
//! Each event is processed while holding the target machine's turn lock. A
//! turn holds at most one such lock at a time, so turns on different threads
//! serialize per instance without being able to deadlock.

use crate::bridge::Bridges;
use crate::config::EngineConfig;
use crate::definition::{State, TransitionTable};
use crate::error::CoreError;
use crate::event::{Payload, PendingEvent};
use crate::instance::{downcast, Entity, InstanceId, InstanceRef, Kind};
use crate::machine::{Dispatch, HistoryEntry, StateMachine, StateMachineOwner};
use crate::registry::InstanceRegistry;
use crate::relationship::RelationshipRegistry;
use crate::timer::{EventSink, TimerService};
use dashmap::DashMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

struct ActiveTurn {
    runtime: u64,
    queue: VecDeque<PendingEvent>,
}

thread_local! {
    static ACTIVE_TURN: RefCell<Option<ActiveTurn>> = const { RefCell::new(None) };
}

/// Installs a fresh turn queue for the current thread and restores the
/// previous one (a turn of another runtime) when dropped.
struct TurnScope {
    saved: Option<ActiveTurn>,
}

impl TurnScope {
    fn enter(runtime: u64) -> Self {
        let saved = ACTIVE_TURN.with(|turn| {
            turn.replace(Some(ActiveTurn {
                runtime,
                queue: VecDeque::new(),
            }))
        });
        Self { saved }
    }

    fn pop(&self) -> Option<PendingEvent> {
        ACTIVE_TURN.with(|turn| {
            turn.borrow_mut()
                .as_mut()
                .and_then(|active| active.queue.pop_front())
        })
    }

    fn clear(&self) -> usize {
        ACTIVE_TURN.with(|turn| {
            turn.borrow_mut()
                .as_mut()
                .map(|active| {
                    let dropped = active.queue.len();
                    active.queue.clear();
                    dropped
                })
                .unwrap_or(0)
        })
    }
}

impl Drop for TurnScope {
    fn drop(&mut self) {
        let saved = self.saved.take();
        let _ = ACTIVE_TURN.try_with(|turn| turn.replace(saved));
    }
}

/// Builds a new instance of a kind with the given identifier.
pub type Factory = Arc<dyn Fn(&Runtime, InstanceId) -> Spawned + Send + Sync>;

/// A freshly constructed instance, with its state machine if it has one.
pub struct Spawned {
    entity: Arc<dyn Entity>,
    machine: Option<Arc<dyn Dispatch>>,
}

impl Spawned {
    /// An instance without behavior.
    pub fn plain<T: Entity>(entity: Arc<T>) -> Self {
        Self {
            entity,
            machine: None,
        }
    }

    /// An instance whose state machine is bound at construction.
    pub fn stateful<O: StateMachineOwner>(owner: Arc<O>) -> Self {
        let machine: Arc<dyn Dispatch> = owner.clone();
        Self {
            entity: owner,
            machine: Some(machine),
        }
    }

    pub fn handle(&self) -> &InstanceRef {
        self.entity.handle()
    }
}

/// The shared runtime context.
///
/// Everything an instance needs (registries, timers, bridges, event
/// dispatch) is reached through this value; there is no global state.
pub struct Runtime {
    id: u64,
    config: EngineConfig,
    instances: InstanceRegistry,
    relationships: RelationshipRegistry,
    bridges: Bridges,
    timers: TimerService,
    factories: DashMap<Kind, Factory>,
    machines: DashMap<InstanceRef, Arc<dyn Dispatch>>,
}

impl Runtime {
    /// Creates a runtime. Timers are driven by the tokio runtime current at
    /// this call, if any.
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Self::with_driver(config, Handle::try_current().ok())
    }

    /// Creates a runtime whose timers run on `driver` when scheduled from
    /// outside a tokio runtime.
    pub fn with_driver(config: EngineConfig, driver: Option<Handle>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Runtime>| {
            let sink: Weak<dyn EventSink> = weak.clone();
            Runtime {
                id: NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed),
                config,
                instances: InstanceRegistry::new(),
                relationships: RelationshipRegistry::new(),
                bridges: Bridges::new(),
                timers: TimerService::new(sink, driver),
                factories: DashMap::new(),
                machines: DashMap::new(),
            }
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    pub fn relationships(&self) -> &RelationshipRegistry {
        &self.relationships
    }

    pub fn bridges(&self) -> &Bridges {
        &self.bridges
    }

    pub fn timers(&self) -> &TimerService {
        &self.timers
    }

    /// A state machine in `table`'s initial state, with this runtime's
    /// history limit.
    pub fn new_machine<O>(&self, table: Arc<TransitionTable<O>>) -> StateMachine<O> {
        StateMachine::new(table).with_history_limit(self.config.history_limit)
    }

    // =========================================================================
    // Instance lifecycle
    // =========================================================================

    /// Registers the constructor for a kind, replacing any previous one.
    pub fn register_factory<F>(&self, kind: impl Into<Kind>, factory: F)
    where
        F: Fn(&Runtime, InstanceId) -> Spawned + Send + Sync + 'static,
    {
        let kind = kind.into();
        self.instances.register_kind(&kind);
        tracing::debug!("factory registered for kind {}", kind);
        self.factories.insert(kind, Arc::new(factory));
    }

    pub fn has_factory(&self, kind: &Kind) -> bool {
        self.factories.contains_key(kind)
    }

    /// Creates and stores an instance of `kind` with a fresh identifier.
    pub fn create(&self, kind: impl Into<Kind>) -> Result<Arc<dyn Entity>, CoreError> {
        self.create_with_id(kind, InstanceId::generate())
    }

    /// Creates and stores an instance of `kind` under `id`, replacing any
    /// instance already stored there.
    pub fn create_with_id(
        &self,
        kind: impl Into<Kind>,
        id: impl Into<InstanceId>,
    ) -> Result<Arc<dyn Entity>, CoreError> {
        let kind = kind.into();
        let factory = self
            .factories
            .get(&kind)
            .map(|f| f.value().clone())
            .ok_or_else(|| CoreError::UnknownKind {
                kind: kind.to_string(),
            })?;
        Ok(self.insert(factory(self, id.into())))
    }

    /// [`create`](Self::create), downcast to the concrete type. The instance
    /// stays stored even when the downcast fails.
    pub fn create_as<T: Entity>(&self, kind: impl Into<Kind>) -> Result<Arc<T>, CoreError> {
        let entity = self.create(kind)?;
        let kind = entity.kind().to_string();
        downcast::<T>(entity).ok_or(CoreError::KindMismatch {
            kind,
            expected: std::any::type_name::<T>(),
        })
    }

    /// Stores a constructed instance and binds its state machine.
    pub fn insert(&self, spawned: Spawned) -> Arc<dyn Entity> {
        let Spawned { entity, machine } = spawned;
        let handle = entity.handle().clone();

        self.instances.create(entity.clone());
        match machine {
            Some(machine) => {
                self.machines.insert(handle.clone(), machine);
            }
            None => {
                self.machines.remove(&handle);
            }
        }

        tracing::debug!("instance {} created", handle);
        entity
    }

    /// Stores an entity without behavior.
    pub fn insert_plain<T: Entity>(&self, entity: Arc<T>) -> Arc<T> {
        self.insert(Spawned::plain(entity.clone()));
        entity
    }

    /// Stores a state machine owner and binds its machine.
    pub fn insert_stateful<O: StateMachineOwner>(&self, owner: Arc<O>) -> Arc<O> {
        self.insert(Spawned::stateful(owner.clone()));
        owner
    }

    pub fn resolve(&self, handle: &InstanceRef) -> Option<Arc<dyn Entity>> {
        self.instances.find(&handle.kind, &handle.id)
    }

    pub fn resolve_as<T: Entity>(&self, handle: &InstanceRef) -> Option<Arc<T>> {
        self.instances.find_as::<T>(&handle.kind, &handle.id)
    }

    /// Instances related to `source` across `rel` that are still stored and
    /// are of type `T`.
    pub fn select_related_as<'a, T: Entity>(
        &self,
        rel: &str,
        source: impl Into<Option<&'a InstanceRef>>,
    ) -> Vec<Arc<T>> {
        self.relationships
            .select_related(rel, source)
            .iter()
            .filter_map(|handle| self.resolve_as::<T>(handle))
            .collect()
    }

    pub fn select_one_related_as<'a, T: Entity>(
        &self,
        rel: &str,
        source: impl Into<Option<&'a InstanceRef>>,
    ) -> Option<Arc<T>> {
        let handle = self.relationships.select_one_related(rel, source)?;
        self.resolve_as::<T>(&handle)
    }

    /// Deletes an instance together with its links, its pending timers and
    /// its state machine binding.
    pub fn delete_instance(&self, handle: &InstanceRef) -> bool {
        let removed = self.instances.delete(&handle.kind, &handle.id).is_some();
        let links = self.relationships.unlink_all(handle);
        let timers = self.timers.cancel_for(handle);
        self.machines.remove(handle);

        if removed {
            tracing::debug!(
                "instance {} deleted ({} links, {} timers)",
                handle,
                links,
                timers
            );
        }
        removed
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Delivers an event to the state machine bound to `target`.
    ///
    /// Outside a turn this runs a full turn and returns whether the event
    /// fired a transition. Called from an action, it queues the event on the
    /// running turn and returns false.
    ///
    /// Inside an action the return value says nothing about whether the
    /// queued event will be taken; do not branch on it there. Use
    /// [`ActionContext::generate_to`](crate::ActionContext::generate_to) to
    /// make the intent explicit.
    pub fn dispatch(&self, target: &InstanceRef, event: &str, payload: Payload) -> bool {
        match self.try_enqueue(PendingEvent::new(target.clone(), event, payload)) {
            Ok(()) => {
                tracing::debug!("{} to {} deferred to the running turn", event, target);
                false
            }
            Err(pending) => self.run_turn(pending),
        }
    }

    /// Queues an event on the running turn, or runs a new turn for it.
    pub(crate) fn enqueue(&self, pending: PendingEvent) {
        if let Err(pending) = self.try_enqueue(pending) {
            self.run_turn(pending);
        }
    }

    fn try_enqueue(&self, pending: PendingEvent) -> Result<(), PendingEvent> {
        ACTIVE_TURN.with(|turn| match turn.borrow_mut().as_mut() {
            Some(active) if active.runtime == self.id => {
                active.queue.push_back(pending);
                Ok(())
            }
            _ => Err(pending),
        })
    }

    fn run_turn(&self, first: PendingEvent) -> bool {
        let scope = TurnScope::enter(self.id);
        let mut next = Some(first);
        let mut first_taken: Option<bool> = None;
        let mut processed = 0usize;

        while let Some(pending) = next.take() {
            let Some(machine) = self.machine(&pending.target) else {
                tracing::warn!(
                    "no state machine bound to {}; {} dropped",
                    pending.target,
                    pending.event
                );
                first_taken.get_or_insert(false);
                processed += 1;
                next = self.next_event(&scope, processed);
                continue;
            };

            let lock = machine.turn_lock();
            let _turn = lock.lock();
            let mut current = pending;
            loop {
                let taken = machine.step(self, &current.event, &current.payload);
                first_taken.get_or_insert(taken);
                processed += 1;

                // Stay under the held lock while the queue keeps targeting
                // the same machine.
                match self.next_event(&scope, processed) {
                    Some(event)
                        if event.target == current.target
                            && self
                                .machine(&event.target)
                                .is_some_and(|bound| Arc::ptr_eq(&bound, &machine)) =>
                    {
                        current = event;
                    }
                    other => {
                        next = other;
                        break;
                    }
                }
            }
        }

        first_taken.unwrap_or(false)
    }

    fn next_event(&self, scope: &TurnScope, processed: usize) -> Option<PendingEvent> {
        let limit = self.config.max_cascade;
        if limit > 0 && processed >= limit {
            let dropped = scope.clear();
            if dropped > 0 {
                tracing::error!(
                    "dispatch turn reached max_cascade={}; {} queued events dropped",
                    limit,
                    dropped
                );
            }
            return None;
        }
        scope.pop()
    }

    fn machine(&self, handle: &InstanceRef) -> Option<Arc<dyn Dispatch>> {
        self.machines.get(handle).map(|m| m.value().clone())
    }

    pub fn has_state_machine(&self, handle: &InstanceRef) -> bool {
        self.machines.contains_key(handle)
    }

    pub fn current_state(&self, handle: &InstanceRef) -> Option<State> {
        self.machine(handle).map(|m| m.current_state())
    }

    pub fn history(&self, handle: &InstanceRef) -> Vec<HistoryEntry> {
        self.machine(handle)
            .map(|m| m.history())
            .unwrap_or_default()
    }

    /// Cancels every pending timer. Instances and links are left in place.
    pub fn shutdown(&self) {
        let cancelled = self.timers.cancel_all();
        tracing::info!("runtime shut down; {} pending timers cancelled", cancelled);
    }
}

impl EventSink for Runtime {
    fn post(&self, target: &InstanceRef, event: &str, payload: Payload) {
        if !self.dispatch(target, event, payload) {
            tracing::debug!("posted event {} was not taken by {}", event, target);
        }
    }
}
