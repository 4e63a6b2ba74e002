use anyhow::Result;
use commerce_core::{
    EngineConfig, EventSubscriptions, EventSubscriptionsBuilder, HostEvent, HostEventKind,
    PluginContext, Schema,
};
use commerce_store::{PluginRegistry, SchemaStorage};
use semver::Version;
use tracing::{debug, info};

use crate::base::{add_product_type_locale, seed_defaults};
use crate::engine::{SchemaOutcome, StepEvent, UpgradeEngine, UpgradePolicy};
use crate::error::LifecycleError;
use crate::migrations::market_upgrade_plan;
use crate::plan::UpgradePlan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub outcome: SchemaOutcome,
    pub seeded: bool,
}

/// Install hooks and event wiring for the Commerce plugin.
#[derive(Debug, Clone)]
pub struct CommercePlugin {
    config: EngineConfig,
    plan: UpgradePlan,
}

impl CommercePlugin {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Ok(Self {
            config,
            plan: market_upgrade_plan()?,
        })
    }

    pub fn with_plan(config: EngineConfig, plan: UpgradePlan) -> Self {
        Self { config, plan }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plan(&self) -> &UpgradePlan {
        &self.plan
    }

    pub fn context(&self) -> PluginContext {
        PluginContext::from_config(&self.config)
    }

    pub fn before_install(&self, host_version: &Version) -> Result<(), LifecycleError> {
        let required = &self.config.min_host_version;
        if !required.matches(host_version) {
            return Err(LifecycleError::HostTooOld {
                required: required.clone(),
                found: host_version.clone(),
            });
        }
        debug!(host_version = %host_version, "host version accepted");
        Ok(())
    }

    /// Runs the host version check, schema creation or upgrade, then seeding.
    pub fn install<R, S, F>(
        &self,
        host_version: &Version,
        registry: &R,
        storage: &mut S,
        observer: F,
    ) -> Result<InstallReport, LifecycleError>
    where
        R: PluginRegistry,
        S: SchemaStorage,
        F: FnMut(StepEvent<'_>),
    {
        self.before_install(host_version)?;

        let outcome = {
            let mut engine = UpgradeEngine::new(
                registry,
                &self.plan,
                &mut *storage,
                UpgradePolicy::from_config(&self.config),
                self.context(),
            );
            engine.ensure_schema_with(observer)?
        };

        let seeded = self.after_install(&outcome, storage)?;
        info!(
            upgraded = outcome.is_upgrade(),
            seeded, "commerce install finished"
        );
        Ok(InstallReport { outcome, seeded })
    }

    /// Seeds default records after a fresh install. Returns whether seeding ran.
    pub fn after_install<S>(&self, outcome: &SchemaOutcome, storage: &mut S) -> Result<bool, LifecycleError>
    where
        S: SchemaStorage,
    {
        if !outcome.seed_after_install {
            debug!("skipping seed after upgrade");
            return Ok(false);
        }

        storage.begin_scope().map_err(LifecycleError::Seed)?;
        let context = self.context();
        if let Err(err) = seed_defaults(storage.schema_mut(), &context) {
            storage.rollback_scope().map_err(LifecycleError::Seed)?;
            return Err(LifecycleError::Seed(err));
        }
        storage.commit_scope().map_err(LifecycleError::Seed)?;
        Ok(true)
    }

    /// Subscriptions the plugin owns, open for the host to add its own.
    pub fn subscriptions_builder(&self) -> EventSubscriptionsBuilder<Schema> {
        EventSubscriptions::builder(self.config.console).on(
            HostEventKind::LocaleAdded,
            "productTypes.addLocaleHandler",
            |event, schema: &mut Schema| {
                if let HostEvent::LocaleAdded { locale } = event {
                    let added = add_product_type_locale(schema, locale)?;
                    debug!(locale = locale.as_str(), added, "product type locales added");
                }
                Ok(())
            },
        )
    }

    pub fn event_subscriptions(&self) -> EventSubscriptions<Schema> {
        self.subscriptions_builder().build()
    }
}
