mod base;
mod engine;
mod error;
mod legacy;
mod lifecycle;
mod migrations;
mod plan;

pub use base::{add_product_type_locale, base_schema, seed_defaults};
pub use engine::{SchemaOutcome, SchemaPath, StepEvent, UpgradeEngine, UpgradePolicy, UpgradeState};
pub use error::{LifecycleError, UpgradeError};
pub use legacy::market_legacy_schema;
pub use lifecycle::{CommercePlugin, InstallReport};
pub use migrations::{market_upgrade_plan, options_signature, MARKET_UPGRADE_STEPS};
pub use plan::{MigrationStep, StepFn, StepProvider, UpgradePlan};
