use std::collections::HashSet;
use std::fmt;

use anyhow::{anyhow, Result};
use commerce_core::{PluginContext, Schema};

/// Forward-only schema change. Returning an error marks the step failed.
pub type StepFn = fn(&mut Schema, &PluginContext) -> Result<()>;

#[derive(Clone, Copy)]
pub struct MigrationStep {
    identifier: &'static str,
    apply: StepFn,
}

impl MigrationStep {
    pub const fn new(identifier: &'static str, apply: StepFn) -> Self {
        Self { identifier, apply }
    }

    pub fn identifier(&self) -> &'static str {
        self.identifier
    }

    pub fn apply(&self, schema: &mut Schema, context: &PluginContext) -> Result<()> {
        (self.apply)(schema, context)
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// Source of the ordered steps the engine executes.
pub trait StepProvider {
    /// Steps in required execution order.
    fn steps(&self) -> &[MigrationStep];

    fn resolve_step(&self, identifier: &str, _context: &PluginContext) -> Option<&MigrationStep> {
        self.steps()
            .iter()
            .find(|step| step.identifier() == identifier)
    }
}

/// Steps in declaration order. Identifiers are not sorted: later steps
/// assume the shapes earlier ones produce, whatever their names say.
#[derive(Debug, Clone)]
pub struct UpgradePlan {
    steps: Vec<MigrationStep>,
}

impl UpgradePlan {
    pub fn new(steps: impl IntoIterator<Item = MigrationStep>) -> Result<Self> {
        let steps = steps.into_iter().collect::<Vec<_>>();
        let mut seen = HashSet::new();
        for step in &steps {
            if step.identifier().trim().is_empty() {
                return Err(anyhow!("migration step identifier must not be empty"));
            }
            if !seen.insert(step.identifier()) {
                return Err(anyhow!(
                    "duplicate migration step identifier '{}'",
                    step.identifier()
                ));
            }
        }
        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        self.steps.iter().map(MigrationStep::identifier).collect()
    }
}

impl StepProvider for UpgradePlan {
    fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }
}
