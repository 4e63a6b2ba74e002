use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use anyhow::anyhow;
use commerce_core::{EngineConfig, PluginContext};
use commerce_store::{PluginRegistry, SchemaStorage};
use tracing::{debug, error, info, warn};

use crate::base::base_schema;
use crate::error::UpgradeError;
use crate::plan::StepProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    NotChecked,
    FreshInstall,
    UpgradePending,
    UpgradeInProgress,
    Committed,
    RolledBack,
}

impl UpgradeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotChecked => "not_checked",
            Self::FreshInstall => "fresh_install",
            Self::UpgradePending => "upgrade_pending",
            Self::UpgradeInProgress => "upgrade_in_progress",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaPath {
    FreshInstall,
    Upgraded {
        from_version: String,
        applied: Vec<&'static str>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaOutcome {
    pub path: SchemaPath,
    /// False after an upgrade: the migrated data must not be seeded over.
    pub seed_after_install: bool,
}

impl SchemaOutcome {
    pub fn is_upgrade(&self) -> bool {
        matches!(self.path, SchemaPath::Upgraded { .. })
    }
}

/// Progress notifications emitted while a plan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent<'a> {
    Started {
        index: usize,
        total: usize,
        identifier: &'static str,
    },
    Applied {
        index: usize,
        total: usize,
        identifier: &'static str,
    },
    Failed {
        index: usize,
        total: usize,
        identifier: &'static str,
        reason: &'a str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePolicy {
    pub legacy_product: String,
    pub source_version: String,
}

impl UpgradePolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            legacy_product: config.legacy_product.clone(),
            source_version: config.upgrade_source_version.clone(),
        }
    }
}

/// Decides between a fresh install and an upgrade from the legacy product,
/// and runs the upgrade plan inside one storage scope.
pub struct UpgradeEngine<'a, R, P, S> {
    registry: &'a R,
    provider: &'a P,
    storage: &'a mut S,
    policy: UpgradePolicy,
    context: PluginContext,
    state: UpgradeState,
    seed_after_install: bool,
}

impl<'a, R, P, S> UpgradeEngine<'a, R, P, S>
where
    R: PluginRegistry,
    P: StepProvider,
    S: SchemaStorage,
{
    pub fn new(
        registry: &'a R,
        provider: &'a P,
        storage: &'a mut S,
        policy: UpgradePolicy,
        context: PluginContext,
    ) -> Self {
        Self {
            registry,
            provider,
            storage,
            policy,
            context,
            state: UpgradeState::NotChecked,
            seed_after_install: true,
        }
    }

    pub fn state(&self) -> UpgradeState {
        self.state
    }

    pub fn seed_after_install(&self) -> bool {
        self.seed_after_install
    }

    pub fn ensure_schema(&mut self) -> Result<SchemaOutcome, UpgradeError> {
        self.ensure_schema_with(|_| {})
    }

    /// Same as [`Self::ensure_schema`], reporting each step to `observer`.
    pub fn ensure_schema_with<F>(&mut self, mut observer: F) -> Result<SchemaOutcome, UpgradeError>
    where
        F: FnMut(StepEvent<'_>),
    {
        self.state = UpgradeState::NotChecked;
        let legacy = self
            .registry
            .find_installed_product(&self.policy.legacy_product)
            .map_err(UpgradeError::Registry)?;

        let Some(record) = legacy else {
            info!(
                legacy_product = self.policy.legacy_product.as_str(),
                "legacy product not installed; creating base schema"
            );
            self.create_base_schema()?;
            self.state = UpgradeState::FreshInstall;
            self.seed_after_install = true;
            return Ok(SchemaOutcome {
                path: SchemaPath::FreshInstall,
                seed_after_install: true,
            });
        };

        if record.version != self.policy.source_version {
            warn!(
                legacy_product = record.name.as_str(),
                found = record.version.as_str(),
                required = self.policy.source_version.as_str(),
                "legacy product is not at the supported upgrade source version"
            );
            return Err(UpgradeError::UnsupportedUpgradeSource {
                product: record.name,
                found: record.version,
                required: self.policy.source_version.clone(),
            });
        }

        self.state = UpgradeState::UpgradePending;
        info!(
            legacy_product = record.name.as_str(),
            version = record.version.as_str(),
            steps = self.provider.steps().len(),
            "upgrading legacy schema"
        );

        let depth = self
            .storage
            .begin_scope()
            .map_err(UpgradeError::Storage)?;
        debug!(depth, "upgrade scope opened");
        self.state = UpgradeState::UpgradeInProgress;
        self.seed_after_install = false;

        let applied = match self.apply_plan(&mut observer) {
            Ok(applied) => applied,
            Err(err) => {
                self.roll_back();
                return Err(err);
            }
        };

        // A failed commit leaves the scope closed with its work undone.
        if let Err(err) = self.storage.commit_scope() {
            self.state = UpgradeState::RolledBack;
            return Err(UpgradeError::Storage(err));
        }
        self.state = UpgradeState::Committed;
        info!(steps = applied.len(), "legacy schema upgrade committed");

        Ok(SchemaOutcome {
            path: SchemaPath::Upgraded {
                from_version: record.version,
                applied,
            },
            seed_after_install: false,
        })
    }

    fn create_base_schema(&mut self) -> Result<(), UpgradeError> {
        let base = base_schema();
        let schema = self.storage.schema_mut();
        if let Some(existing) = base.table_names().find(|name| schema.has_table(name)) {
            return Err(UpgradeError::Storage(anyhow!(
                "cannot create base schema: table '{existing}' already exists"
            )));
        }

        let before = schema.clone();
        for (name, table) in base.tables {
            if let Err(err) = schema.create_table(&name, table) {
                *schema = before;
                return Err(UpgradeError::Storage(err));
            }
        }

        if let Err(err) = self.storage.autocommit() {
            *self.storage.schema_mut() = before;
            return Err(UpgradeError::Storage(err));
        }
        debug!("base schema created");
        Ok(())
    }

    /// A panicking step is caught and reported as a failed step. The process
    /// panic hook still runs first; callers that want quiet output install
    /// their own hook around the run.
    fn apply_plan(
        &mut self,
        observer: &mut dyn FnMut(StepEvent<'_>),
    ) -> Result<Vec<&'static str>, UpgradeError> {
        let provider = self.provider;
        let steps = provider.steps();
        let total = steps.len();
        let mut applied = Vec::with_capacity(total);

        for (index, step) in steps.iter().enumerate() {
            let identifier = step.identifier();
            observer(StepEvent::Started {
                index,
                total,
                identifier,
            });
            debug!(step = identifier, position = index + 1, total, "applying migration step");

            let schema = self.storage.schema_mut();
            let context = &self.context;
            let result = panic::catch_unwind(AssertUnwindSafe(|| step.apply(schema, context)));
            let failure = match result {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(format!("{err:#}")),
                Err(payload) => Some(panic_message(payload.as_ref())),
            };

            if let Some(reason) = failure {
                error!(
                    step = identifier,
                    reason = reason.as_str(),
                    "Market to Commerce upgrade error; could not run step"
                );
                observer(StepEvent::Failed {
                    index,
                    total,
                    identifier,
                    reason: &reason,
                });
                return Err(UpgradeError::UpgradeStepFailed {
                    identifier: identifier.to_string(),
                    reason,
                });
            }

            observer(StepEvent::Applied {
                index,
                total,
                identifier,
            });
            applied.push(identifier);
        }
        Ok(applied)
    }

    fn roll_back(&mut self) {
        match self.storage.rollback_scope() {
            Ok(()) => info!("upgrade scope rolled back"),
            Err(err) => error!(error = %format!("{err:#}"), "failed to roll back upgrade scope"),
        }
        self.state = UpgradeState::RolledBack;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("step panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("step panicked: {message}")
    } else {
        "step panicked".to_string()
    }
}
