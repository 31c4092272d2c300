//! Parameter changes scheduled for specific steps of a run.
//!
//! Mutations patch the serialized configuration by name, so any field of
//! [`SimulationConfig`] can be targeted (`"growth_rate"`, `"volume.max"`, ...).
//! The patched configuration is validated before it replaces the live one.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::simulation::{RunSummary, Simulation};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    /// Replace the value outright.
    Set(Value),
    /// Multiply the current numeric value.
    Scale(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Applied just before this step index runs (0 = before the first step).
    pub step: u64,
    /// Dotted path into the configuration.
    pub parameter: String,
    pub change: Change,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuntimeMutator {
    mutations: Vec<Mutation>,
}

impl RuntimeMutator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, step: u64, parameter: impl Into<String>, value: impl Into<Value>) {
        self.mutations.push(Mutation {
            step,
            parameter: parameter.into(),
            change: Change::Set(value.into()),
        });
    }

    pub fn schedule_scale(&mut self, step: u64, parameter: impl Into<String>, factor: f64) {
        self.mutations.push(Mutation {
            step,
            parameter: parameter.into(),
            change: Change::Scale(factor),
        });
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Applies every mutation scheduled for `step` in one go and returns how
    /// many fired. On error the simulation keeps its current configuration.
    pub fn apply(&self, step: u64, sim: &mut Simulation) -> Result<usize> {
        let due: Vec<&Mutation> = self.mutations.iter().filter(|m| m.step == step).collect();
        if due.is_empty() {
            return Ok(0);
        }

        let mut value = serde_json::to_value(&sim.config)?;
        for mutation in &due {
            let slot = lookup(&mut value, &mutation.parameter)?;
            let previous = slot.clone();
            *slot = match &mutation.change {
                Change::Set(v) => v.clone(),
                Change::Scale(factor) => {
                    let current = previous.as_f64().ok_or_else(|| {
                        Error::invalid("mutation", format!("`{}` is not numeric", mutation.parameter))
                    })?;
                    serde_json::Number::from_f64(current * factor)
                        .map(Value::Number)
                        .ok_or_else(|| {
                            Error::invalid("mutation", format!("scaling `{}` is not finite", mutation.parameter))
                        })?
                }
            };
            tracing::info!(step, parameter = %mutation.parameter, from = %previous, to = %slot, "parameter mutated");
        }

        let config: SimulationConfig = serde_json::from_value(value)?;
        sim.set_config(config)?;
        Ok(due.len())
    }

    /// Like [`Simulation::run`], applying due mutations before every step.
    pub fn drive<R: Rng>(&self, sim: &mut Simulation, steps: u64, rng: &mut R) -> Result<RunSummary> {
        let mut steps_run = 0;
        let mut stopped_early = false;
        for _ in 0..steps {
            self.apply(sim.steps, sim)?;
            if sim.should_stop() {
                tracing::info!(time = sim.time, steps = steps_run, "auto-stop: no live tips");
                stopped_early = true;
                break;
            }
            sim.step(rng);
            steps_run += 1;
        }
        Ok(RunSummary {
            steps_run,
            stopped_early,
            stats: sim.stats(),
        })
    }
}

// Walks a dotted path through nested objects. A disabled toggle on the way
// has no fields to reach into; it has to be `Set` as a whole.
fn lookup<'a>(root: &'a mut Value, path: &str) -> Result<&'a mut Value> {
    let mut current = root;
    let mut walked = 0;
    for key in path.split('.') {
        if current.is_null() {
            return Err(Error::invalid(
                "mutation",
                format!("`{}` is disabled; set it as a whole before changing `{path}`", &path[..walked - 1]),
            ));
        }
        current = current
            .as_object_mut()
            .and_then(|map| map.get_mut(key))
            .ok_or_else(|| Error::UnknownParameter(path.to_owned()))?;
        walked += key.len() + 1;
    }
    Ok(current)
}
