//! Scripted event sequences played against a machine.

use crate::config::Config;
use modelrt_core::{InstanceRef, Payload, Runtime, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One scripted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    /// Pause after the step, in milliseconds.
    #[serde(default)]
    pub wait_ms: u64,
}

impl ScenarioStep {
    pub fn new(event: &str, payload: Value) -> Self {
        Self {
            event: event.to_string(),
            payload,
            wait_ms: 0,
        }
    }

    pub fn wait_ms(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }
}

/// What one step did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub event: String,
    pub taken: bool,
    /// Machine state once the step's turn finished.
    pub state: Option<State>,
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn new(steps: Vec<ScenarioStep>) -> Self {
        Self { steps }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.scenario.clone())
    }

    pub fn steps(&self) -> &[ScenarioStep] {
        &self.steps
    }

    /// Dispatches every step to `machine` in order, pausing between steps as
    /// configured.
    pub async fn play(&self, runtime: &Runtime, machine: &InstanceRef) -> Vec<StepOutcome> {
        let mut outcomes = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let payload = Payload::from(step.payload.clone());
            let taken = runtime.dispatch(machine, &step.event, payload);
            let state = runtime.current_state(machine);

            tracing::info!(
                "step {}/{}: {} -> {} (state {})",
                index + 1,
                self.steps.len(),
                step.event,
                if taken { "taken" } else { "ignored" },
                state.as_ref().map(State::as_str).unwrap_or("-")
            );
            outcomes.push(StepOutcome {
                event: step.event.clone(),
                taken,
                state,
            });

            if step.wait_ms > 0 {
                tokio::time::sleep(Duration::from_millis(step.wait_ms)).await;
            }
        }

        outcomes
    }
}
