//! Trigger gating between operations of one run.
//!
//! An operation that changed something fires its `triggers`; a later
//! operation with `triggered_by` runs only if at least one of those names
//! has fired. Triggers accumulate for the lifetime of a context and are
//! never cleared, so an operation sees only what ran before it.

use crate::error::{Error, Result};
use crate::types::Outcome;
use serde_json::{Map, Value};

/// Triggers fired so far, in firing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerLedger {
    fired: Vec<String>,
}

impl TriggerLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trigger. Firing twice is the same as firing once.
    pub fn fire(&mut self, name: &str) {
        if !self.is_fired(name) {
            log::debug!("trigger fired: {name}");
            self.fired.push(name.to_string());
        }
    }

    /// Whether `name` has fired.
    pub fn is_fired(&self, name: &str) -> bool {
        self.fired.iter().any(|f| f == name)
    }

    /// Whether any of `names` has fired.
    pub fn any_fired(&self, names: &[String]) -> bool {
        names.iter().any(|n| self.is_fired(n))
    }

    /// All fired triggers.
    pub fn fired(&self) -> &[String] {
        &self.fired
    }
}

/// Per-call trigger wiring: what enables this operation and what it fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gate {
    /// Triggers fired when the operation reports a change.
    pub triggers: Vec<String>,
    /// The operation runs only if one of these has fired. Empty = always.
    pub triggered_by: Vec<String>,
}

impl Gate {
    /// A gate that always runs and fires nothing.
    pub fn open() -> Self {
        Self::default()
    }

    /// Fire `name` when the operation changes something.
    pub fn fires(mut self, name: impl Into<String>) -> Self {
        self.triggers.push(name.into());
        self
    }

    /// Run only once `name` (or another `after` name) has fired.
    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.triggered_by.push(name.into());
        self
    }

    /// Reject empty trigger names.
    pub fn validate(&self) -> Result<()> {
        let empty = |names: &[String]| names.iter().any(|n| n.trim().is_empty());
        if empty(&self.triggers) {
            return Err(Error::invalid("trigger names must not be empty (triggers)"));
        }
        if empty(&self.triggered_by) {
            return Err(Error::invalid("trigger names must not be empty (triggered_by)"));
        }
        Ok(())
    }

    /// Whether the operation may run given what has fired.
    pub fn admits(&self, ledger: &TriggerLedger) -> bool {
        self.triggered_by.is_empty() || ledger.any_fired(&self.triggered_by)
    }

    /// Fire this gate's triggers if `outcome` is a change.
    pub fn record(&self, outcome: Outcome, ledger: &mut TriggerLedger) {
        if outcome.changed() {
            for name in &self.triggers {
                ledger.fire(name);
            }
        }
    }

    /// Pull `triggers` / `triggered_by` out of a dynamic argument object.
    ///
    /// Each may be a string or a list of strings; anything else is an
    /// `InvalidArgument`. The keys are removed from `args`.
    pub fn from_args(args: &mut Map<String, Value>) -> Result<Self> {
        let gate = Self {
            triggers: take_names(args, "triggers")?,
            triggered_by: take_names(args, "triggered_by")?,
        };
        gate.validate()?;
        Ok(gate)
    }
}

/// Operation requests that carry a [`Gate`].
pub trait Gated: Sized {
    /// The request's gate.
    fn gate(&self) -> &Gate;

    /// Mutable access to the request's gate.
    fn gate_mut(&mut self) -> &mut Gate;

    /// Fire `name` when this operation changes something.
    fn fires(mut self, name: impl Into<String>) -> Self {
        self.gate_mut().triggers.push(name.into());
        self
    }

    /// Run only once `name` has fired.
    fn after(mut self, name: impl Into<String>) -> Self {
        self.gate_mut().triggered_by.push(name.into());
        self
    }

    /// Replace the whole gate.
    fn with_gate(mut self, gate: Gate) -> Self {
        *self.gate_mut() = gate;
        self
    }
}

/// Implement [`Gated`] for request structs with a `gate` field.
macro_rules! impl_gated {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::trigger::Gated for $ty {
                fn gate(&self) -> &$crate::trigger::Gate {
                    &self.gate
                }

                fn gate_mut(&mut self) -> &mut $crate::trigger::Gate {
                    &mut self.gate
                }
            }
        )+
    };
}

pub(crate) use impl_gated;

fn take_names(args: &mut Map<String, Value>, key: &str) -> Result<Vec<String>> {
    match args.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(name)) => Ok(vec![name]),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(name),
                other => Err(Error::invalid(format!(
                    "{key} must contain only strings, found {other}"
                ))),
            })
            .collect(),
        Some(other) => Err(Error::invalid(format!(
            "{key} must be a string or a list of strings, found {other}"
        ))),
    }
}
