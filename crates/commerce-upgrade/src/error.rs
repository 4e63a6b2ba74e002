use semver::{Version, VersionReq};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpgradeError {
    /// The installed legacy product is not at the one version an upgrade
    /// path exists from. Not retryable: the operator must first move the
    /// legacy product to `required`.
    #[error("{product} plugin must be upgraded to {required} before installing Commerce (found {found})")]
    UnsupportedUpgradeSource {
        product: String,
        found: String,
        required: String,
    },

    /// A step failed or panicked; every change made since the upgrade scope
    /// opened has been rolled back.
    #[error("Market to Commerce upgrade error: could not run {identifier}: {reason}")]
    UpgradeStepFailed { identifier: String, reason: String },

    #[error("plugin registry lookup failed: {0:#}")]
    Registry(anyhow::Error),

    #[error("schema storage failed: {0:#}")]
    Storage(anyhow::Error),
}

impl UpgradeError {
    /// Identifier of the failing step, when a step failed.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::UpgradeStepFailed { identifier, .. } => Some(identifier),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Craft Commerce requires host version {required} in order to run (found {found})")]
    HostTooOld { required: VersionReq, found: Version },

    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    #[error("post-install seeding failed: {0:#}")]
    Seed(anyhow::Error),
}
