use std::cell::Cell;
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use commerce_core::{
    EngineConfig, HostEvent, InstalledProductRecord, Schema, PLUGIN_NAME, PLUGIN_VERSION,
    SCHEMA_VERSION,
};
use commerce_store::{
    append_transaction_journal_entry, clear_active_transaction, current_unix_timestamp,
    default_user_prefix, execute_with_transaction, read_active_transaction,
    read_transaction_journal, read_transaction_metadata, update_transaction_status,
    FilePluginRegistry, PluginRegistry, SchemaDatabase, SchemaStorage, StoreLayout,
    TransactionJournalEntry, TransactionScope, TransactionStatus,
};
use commerce_upgrade::{
    base_schema, market_legacy_schema, CommercePlugin, InstallReport, LifecycleError, SchemaPath,
    StepEvent, UpgradeError,
};
use semver::Version;
use tracing::{debug, info, warn};

use crate::completion::detect_shell_from_env;
use crate::render::{TerminalProgress, TerminalRenderer};

const PRODUCT_TYPE_LOCALES: &str = "commerce_producttypes_i18n";

pub(crate) fn resolve_layout(prefix: Option<&Path>) -> Result<StoreLayout> {
    let prefix = match prefix {
        Some(prefix) => prefix.to_path_buf(),
        None => default_user_prefix()?,
    };
    Ok(StoreLayout::new(prefix))
}

pub(crate) fn resolve_config_path(layout: &StoreLayout, config: Option<&Path>) -> PathBuf {
    config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| layout.config_path())
}

/// Accepts full semver as well as the host's two-part `major.minor` form.
pub(crate) fn parse_host_version(raw: &str) -> Result<Version> {
    let raw = raw.trim();
    if let Ok(version) = Version::parse(raw) {
        return Ok(version);
    }
    if raw.split('.').count() == 2 {
        if let Ok(version) = Version::parse(&format!("{raw}.0")) {
            return Ok(version);
        }
    }
    Err(anyhow!("invalid host version '{raw}'"))
}

fn normalize_command_token(command: &str) -> String {
    let command = command.trim().to_ascii_lowercase();
    if command.is_empty() {
        "unknown".to_string()
    } else {
        command
    }
}

pub(crate) fn ensure_no_active_transaction_for(layout: &StoreLayout, command: &str) -> Result<()> {
    let command = normalize_command_token(command);
    ensure_no_active_transaction(layout).map_err(|err| {
        anyhow!("cannot {command} (reason=active_transaction command={command}): {err}")
    })
}

fn ensure_no_active_transaction(layout: &StoreLayout) -> Result<()> {
    let active_txid = match read_active_transaction(layout) {
        Ok(active_txid) => active_txid,
        Err(_) => {
            return Err(anyhow!(
                "transaction state requires repair (reason=active_marker_unreadable path={})",
                layout.transaction_active_path().display()
            ));
        }
    };

    let Some(txid) = active_txid else {
        return Ok(());
    };

    let metadata = match read_transaction_metadata(layout, &txid) {
        Ok(metadata) => metadata,
        Err(_) => {
            return Err(anyhow!(
                "transaction {txid} requires repair (reason=metadata_unreadable path={})",
                layout.transaction_metadata_path(&txid).display()
            ));
        }
    };

    let Some(metadata) = metadata else {
        return Err(anyhow!(
            "transaction {txid} requires repair (reason=metadata_missing path={})",
            layout.transaction_metadata_path(&txid).display()
        ));
    };

    if metadata.status.is_terminal() {
        clear_active_transaction(layout)?;
        return Ok(());
    }
    if metadata.status == TransactionStatus::Failed {
        return Err(anyhow!("transaction {txid} requires repair (reason=failed)"));
    }
    Err(anyhow!(
        "transaction {txid} is active (reason=active_status status={})",
        metadata.status.as_str()
    ))
}

pub(crate) fn transaction_health_line(layout: &StoreLayout) -> Result<String> {
    let active_txid = match read_active_transaction(layout) {
        Ok(active_txid) => active_txid,
        Err(_) => {
            return Ok(format!(
                "transaction: failed (reason=active_marker_unreadable path={})",
                layout.transaction_active_path().display()
            ));
        }
    };

    let Some(txid) = active_txid else {
        return Ok("transaction: clean".to_string());
    };

    let metadata = match read_transaction_metadata(layout, &txid) {
        Ok(Some(metadata)) => metadata,
        Ok(None) => {
            return Ok(format!(
                "transaction: failed {txid} (reason=metadata_missing path={})",
                layout.transaction_metadata_path(&txid).display()
            ));
        }
        Err(_) => {
            return Ok(format!(
                "transaction: failed {txid} (reason=metadata_unreadable path={})",
                layout.transaction_metadata_path(&txid).display()
            ));
        }
    };

    if metadata.status == TransactionStatus::Failed {
        return Ok(format!("transaction: failed {txid} (reason=failed)"));
    }
    if metadata.status.is_terminal() {
        clear_active_transaction(layout)?;
        return Ok("transaction: clean".to_string());
    }
    Ok(format!(
        "transaction: active {txid} (operation={} status={})",
        metadata.operation,
        metadata.status.as_str()
    ))
}

/// Journal writer for one install transaction. The observer callback cannot
/// fail, so the first write error is kept and reported by `finish`.
struct InstallJournal<'a> {
    layout: &'a StoreLayout,
    txid: &'a str,
    seq: u64,
    error: Option<anyhow::Error>,
}

impl<'a> InstallJournal<'a> {
    fn new(layout: &'a StoreLayout, txid: &'a str) -> Self {
        Self {
            layout,
            txid,
            seq: 1,
            error: None,
        }
    }

    fn record(&mut self, step: &str, state: &str, detail: Option<&str>) {
        if self.error.is_some() {
            return;
        }
        let entry = TransactionJournalEntry {
            seq: self.seq,
            step: step.to_string(),
            state: state.to_string(),
            detail: detail.map(ToOwned::to_owned),
        };
        match append_transaction_journal_entry(self.layout, self.txid, &entry) {
            Ok(_) => self.seq += 1,
            Err(err) => self.error = Some(err),
        }
    }

    fn finish(self) -> Result<()> {
        match self.error {
            Some(err) => Err(err.context(format!("failed to journal transaction {}", self.txid))),
            None => Ok(()),
        }
    }
}

pub(crate) fn install_preview_lines(
    layout: &StoreLayout,
    config: &EngineConfig,
    host_version: &Version,
) -> Result<Vec<String>> {
    let plugin = CommercePlugin::new(config.clone())?;
    plugin.before_install(host_version)?;

    let registry = FilePluginRegistry::new(layout.clone());
    if let Some(existing) = registry.find_installed_product(PLUGIN_NAME)? {
        return Err(anyhow!("{PLUGIN_NAME} {} is already installed", existing.version));
    }

    let mut lines = vec![format!("host: {host_version} (requires {})", config.min_host_version)];
    match registry.find_installed_product(&config.legacy_product)? {
        None => {
            lines.push("path: fresh install".to_string());
            lines.push("seed: default records".to_string());
        }
        Some(legacy) if legacy.version == config.upgrade_source_version => {
            lines.push(format!(
                "path: upgrade {} {} ({} steps)",
                legacy.name,
                legacy.version,
                plugin.plan().len()
            ));
            lines.push("seed: skipped".to_string());
        }
        Some(legacy) => {
            return Err(UpgradeError::UnsupportedUpgradeSource {
                product: legacy.name,
                found: legacy.version,
                required: config.upgrade_source_version.clone(),
            }
            .into());
        }
    }
    Ok(lines)
}

pub(crate) fn run_install_command(
    layout: &StoreLayout,
    config: &EngineConfig,
    host_version: &Version,
    renderer: TerminalRenderer,
) -> Result<InstallReport> {
    layout.ensure_base_dirs()?;
    ensure_no_active_transaction_for(layout, "install")?;

    let registry = FilePluginRegistry::new(layout.clone());
    if let Some(existing) = registry.find_installed_product(PLUGIN_NAME)? {
        return Err(anyhow!("{PLUGIN_NAME} {} is already installed", existing.version));
    }

    let plugin = CommercePlugin::new(config.clone())?;
    let mut database = SchemaDatabase::open(layout.clone())?;
    let fingerprint = database.schema().fingerprint()?;

    execute_with_transaction(layout, "install", Some(&fingerprint), |tx| {
        let mut journal = InstallJournal::new(layout, &tx.txid);

        // The schema file is only written by the commit of this scope, after
        // the registry records are in place.
        database.begin_scope()?;
        let result = with_quiet_step_panics(|| {
            run_lifecycle(
                &plugin,
                host_version,
                &registry,
                &mut database,
                renderer,
                &mut journal,
            )
        });
        let report = match result {
            Ok(report) => report,
            Err(err) => {
                database.rollback_scope()?;
                update_transaction_status(layout, &tx.txid, TransactionStatus::RolledBack)?;
                journal.finish()?;
                return Err(err.into());
            }
        };

        let path = match &report.outcome.path {
            SchemaPath::FreshInstall => "fresh".to_string(),
            SchemaPath::Upgraded { from_version, .. } => {
                format!("upgrade:{}:{from_version}", config.legacy_product)
            }
        };
        journal.record("ensure_schema", "done", Some(&path));
        if report.seeded {
            journal.record("seed_defaults", "done", None);
        }

        let legacy = if report.outcome.is_upgrade() {
            registry.find_installed_product(&config.legacy_product)?
        } else {
            None
        };
        let recorded = write_install_records(&registry, legacy.as_ref(), &mut journal)
            .and_then(|()| database.commit_scope());
        if let Err(err) = recorded {
            restore_install_records(&registry, legacy.as_ref());
            if database.depth() > 0 {
                database.rollback_scope()?;
            }
            update_transaction_status(layout, &tx.txid, TransactionStatus::RolledBack)?;
            journal.finish()?;
            return Err(err);
        }
        journal.record("commit_schema", "done", None);
        journal.finish()?;
        info!(txid = tx.txid.as_str(), path = path.as_str(), "install committed");
        Ok(report)
    })
}

/// Runs the plugin lifecycle against the working schema, mirroring step
/// progress to the terminal and the journal.
fn run_lifecycle(
    plugin: &CommercePlugin,
    host_version: &Version,
    registry: &FilePluginRegistry,
    database: &mut SchemaDatabase,
    renderer: TerminalRenderer,
    journal: &mut InstallJournal<'_>,
) -> Result<InstallReport, LifecycleError> {
    let mut progress: Option<TerminalProgress> = None;
    let result = plugin.install(host_version, registry, database, |event| match event {
        StepEvent::Started { total, .. } => {
            if progress.is_none() {
                progress = Some(renderer.start_progress("upgrade", total as u64));
            }
        }
        StepEvent::Applied {
            index, identifier, ..
        } => {
            if let Some(progress) = progress.as_mut() {
                progress.advance(index as u64 + 1, identifier);
            }
            journal.record(&format!("step:{identifier}"), "done", None);
        }
        StepEvent::Failed {
            identifier, reason, ..
        } => {
            journal.record(&format!("step:{identifier}"), "failed", Some(reason));
        }
    });

    if let Some(progress) = progress {
        if result.is_ok() {
            progress.finish_success();
        } else {
            progress.finish_abandon();
        }
    }
    result
}

fn commerce_record() -> Result<InstalledProductRecord> {
    let mut record = InstalledProductRecord::new(PLUGIN_NAME, PLUGIN_VERSION);
    record.schema_version = Some(SCHEMA_VERSION.to_string());
    record.installed_at_unix = current_unix_timestamp()?;
    Ok(record)
}

/// Registers Commerce and retires the legacy record, if one is given.
fn write_install_records(
    registry: &FilePluginRegistry,
    legacy: Option<&InstalledProductRecord>,
    journal: &mut InstallJournal<'_>,
) -> Result<()> {
    registry.write_record(&commerce_record()?)?;
    journal.record("write_plugin_record", "done", Some(PLUGIN_NAME));

    if let Some(legacy) = legacy {
        registry.remove_record(&legacy.name)?;
        journal.record("remove_legacy_record", "done", Some(legacy.name.as_str()));
    }
    Ok(())
}

/// Puts the registry back the way the install found it.
fn restore_install_records(
    registry: &FilePluginRegistry,
    legacy: Option<&InstalledProductRecord>,
) {
    if let Err(err) = registry.remove_record(PLUGIN_NAME) {
        warn!(error = %format!("{err:#}"), "failed to remove partial Commerce record");
    }
    if let Some(legacy) = legacy {
        if let Err(err) = registry.write_record(legacy) {
            warn!(
                legacy_product = legacy.name.as_str(),
                error = %format!("{err:#}"),
                "failed to restore legacy record"
            );
        }
    }
}

thread_local! {
    static QUIET_STEP_PANICS: Cell<bool> = const { Cell::new(false) };
}

/// Routes panics raised while a migration step runs to the debug log.
/// The engine reports those panics as failed steps; any other panic goes
/// to the previous hook.
pub(crate) fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if QUIET_STEP_PANICS.with(Cell::get) {
            debug!(panic = %info, "migration step panicked");
        } else {
            previous(info);
        }
    }));
}

#[cfg(test)]
pub(crate) fn step_panics_quiet() -> bool {
    QUIET_STEP_PANICS.with(Cell::get)
}

struct QuietStepPanics;

impl Drop for QuietStepPanics {
    fn drop(&mut self) {
        QUIET_STEP_PANICS.with(|quiet| quiet.set(false));
    }
}

pub(crate) fn with_quiet_step_panics<T>(run: impl FnOnce() -> T) -> T {
    QUIET_STEP_PANICS.with(|quiet| quiet.set(true));
    let _reset = QuietStepPanics;
    run()
}

pub(crate) fn install_summary(report: &InstallReport, config: &EngineConfig) -> Vec<String> {
    let mut lines = Vec::new();
    match &report.outcome.path {
        SchemaPath::FreshInstall => lines.push("created Commerce base schema".to_string()),
        SchemaPath::Upgraded {
            from_version,
            applied,
        } => lines.push(format!(
            "upgraded {} {from_version} schema ({} steps)",
            config.legacy_product,
            applied.len()
        )),
    }
    if report.seeded {
        lines.push("seeded default records".to_string());
    }
    lines.push(format!(
        "installed {PLUGIN_NAME} {PLUGIN_VERSION} (schema {SCHEMA_VERSION})"
    ));
    lines
}

pub(crate) fn plan_lines(plugin: &CommercePlugin) -> Vec<String> {
    let identifiers = plugin.plan().identifiers();
    let width = identifiers.len().to_string().len();
    identifiers
        .iter()
        .enumerate()
        .map(|(index, identifier)| format!("{:>width$}. {identifier}", index + 1))
        .collect()
}

pub(crate) fn status_lines(layout: &StoreLayout, config: &EngineConfig) -> Result<Vec<String>> {
    let mut lines = vec![format!("prefix: {}", layout.prefix().display())];

    let database = SchemaDatabase::open(layout.clone())?;
    let schema = database.schema();
    if schema.tables.is_empty() {
        lines.push("schema: empty".to_string());
    } else {
        let fingerprint = schema.fingerprint()?;
        lines.push(format!(
            "schema: {} tables (fingerprint {})",
            schema.tables.len(),
            &fingerprint[..12]
        ));
    }

    let registry = FilePluginRegistry::new(layout.clone());
    match registry.find_installed_product(PLUGIN_NAME)? {
        Some(record) => lines.push(format!(
            "plugin: {} {} (schema {})",
            record.name,
            record.version,
            record.schema_version.as_deref().unwrap_or("unknown")
        )),
        None => lines.push(format!("plugin: {PLUGIN_NAME} not installed")),
    }
    match registry.find_installed_product(&config.legacy_product)? {
        Some(legacy) if legacy.version == config.upgrade_source_version => {
            lines.push(format!("legacy: {} {} (upgradable)", legacy.name, legacy.version))
        }
        Some(legacy) => lines.push(format!(
            "legacy: {} {} (blocked: requires {})",
            legacy.name, legacy.version, config.upgrade_source_version
        )),
        None => lines.push(format!("legacy: {} not installed", config.legacy_product)),
    }

    lines.push(transaction_health_line(layout)?);
    Ok(lines)
}

pub(crate) fn run_registry_add_command(
    layout: &StoreLayout,
    name: &str,
    version: &str,
) -> Result<PathBuf> {
    layout.ensure_base_dirs()?;
    ensure_no_active_transaction_for(layout, "registry add")?;
    let mut record = InstalledProductRecord::new(name, version.trim());
    record.installed_at_unix = current_unix_timestamp()?;
    FilePluginRegistry::new(layout.clone()).write_record(&record)
}

pub(crate) fn registry_list_lines(layout: &StoreLayout) -> Result<Vec<String>> {
    let records = FilePluginRegistry::new(layout.clone()).read_records()?;
    if records.is_empty() {
        return Ok(vec!["No plugins registered".to_string()]);
    }
    Ok(records
        .iter()
        .map(|record| match &record.schema_version {
            Some(schema_version) => {
                format!("{} {} (schema {schema_version})", record.name, record.version)
            }
            None => format!("{} {}", record.name, record.version),
        })
        .collect())
}

pub(crate) fn run_registry_remove_command(layout: &StoreLayout, name: &str) -> Result<bool> {
    ensure_no_active_transaction_for(layout, "registry remove")?;
    FilePluginRegistry::new(layout.clone()).remove_record(name)
}

/// Announces a new site locale to the plugin. Returns the locale rows added.
pub(crate) fn run_locale_add_command(
    layout: &StoreLayout,
    config: &EngineConfig,
    locale: &str,
) -> Result<usize> {
    layout.ensure_base_dirs()?;
    ensure_no_active_transaction_for(layout, "locale add")?;
    if FilePluginRegistry::new(layout.clone())
        .find_installed_product(PLUGIN_NAME)?
        .is_none()
    {
        return Err(anyhow!("{PLUGIN_NAME} is not installed"));
    }

    let plugin = CommercePlugin::new(config.clone())?;
    let subscriptions = plugin.event_subscriptions();
    let mut database = SchemaDatabase::open(layout.clone())?;
    let locale_rows = |database: &SchemaDatabase| {
        database
            .schema()
            .table(PRODUCT_TYPE_LOCALES)
            .map(|table| table.rows.len())
            .unwrap_or(0)
    };
    let before = locale_rows(&database);

    database.begin_scope()?;
    let event = HostEvent::LocaleAdded {
        locale: locale.to_string(),
    };
    if let Err(err) = subscriptions.dispatch(&event, database.schema_mut()) {
        database.rollback_scope()?;
        return Err(err);
    }
    database.commit_scope()?;
    Ok(locale_rows(&database) - before)
}

/// Loads the Market fixture into an empty store and registers the legacy
/// product, so `install` can be rehearsed against it.
pub(crate) fn run_seed_legacy_command(layout: &StoreLayout, config: &EngineConfig) -> Result<()> {
    layout.ensure_base_dirs()?;
    ensure_no_active_transaction_for(layout, "seed-legacy")?;

    let mut database = SchemaDatabase::open(layout.clone())?;
    if !database.schema().tables.is_empty() {
        return Err(anyhow!(
            "cannot seed legacy fixture: schema already has {} tables",
            database.schema().tables.len()
        ));
    }
    *database.schema_mut() = market_legacy_schema()?;
    database.autocommit()?;

    let mut record = InstalledProductRecord::new(
        config.legacy_product.clone(),
        config.upgrade_source_version.clone(),
    );
    record.installed_at_unix = current_unix_timestamp()?;
    FilePluginRegistry::new(layout.clone()).write_record(&record)?;
    Ok(())
}

/// Registry work an install recorded in its journal before it stopped.
#[derive(Debug, Default)]
struct RecordedInstall {
    legacy: Option<(String, String)>,
    wrote_record: bool,
    removed_legacy: bool,
}

impl RecordedInstall {
    fn from_journal(entries: &[TransactionJournalEntry]) -> Self {
        let mut recorded = Self::default();
        for entry in entries.iter().filter(|entry| entry.state == "done") {
            match entry.step.as_str() {
                "ensure_schema" => {
                    let detail = entry.detail.as_deref().unwrap_or_default();
                    if let Some(("upgrade", rest)) = detail.split_once(':') {
                        recorded.legacy = rest
                            .split_once(':')
                            .map(|(name, version)| (name.to_string(), version.to_string()));
                    }
                }
                "write_plugin_record" => recorded.wrote_record = true,
                "remove_legacy_record" => recorded.removed_legacy = true,
                _ => {}
            }
        }
        recorded
    }
}

/// Brings the registry in line with the schema an interrupted install left
/// behind. Returns a note per record touched.
fn reconcile_install_records(
    layout: &StoreLayout,
    recorded: &RecordedInstall,
    schema_committed: bool,
    schema: &Schema,
) -> Result<Vec<String>> {
    let registry = FilePluginRegistry::new(layout.clone());
    let mut notes = Vec::new();

    if !schema_committed {
        if recorded.wrote_record && registry.remove_record(PLUGIN_NAME)? {
            notes.push(format!("removed {PLUGIN_NAME} record"));
        }
        if let (true, Some((name, version))) = (recorded.removed_legacy, &recorded.legacy) {
            let mut legacy = InstalledProductRecord::new(name.as_str(), version.as_str());
            legacy.installed_at_unix = current_unix_timestamp()?;
            registry.write_record(&legacy)?;
            notes.push(format!("restored {name} {version} record"));
        }
        return Ok(notes);
    }

    let installed = base_schema()
        .table_names()
        .all(|name| schema.has_table(name));
    if !installed {
        return Ok(notes);
    }
    if registry.find_installed_product(PLUGIN_NAME)?.is_none() {
        registry.write_record(&commerce_record()?)?;
        notes.push(format!("wrote {PLUGIN_NAME} record"));
    }
    if let Some((name, _)) = &recorded.legacy {
        if registry.remove_record(name)? {
            notes.push(format!("removed {name} record"));
        }
    }
    Ok(notes)
}

/// Resolves an interrupted transaction. Schema writes are atomic, so the
/// persisted schema either still matches the fingerprint recorded at start
/// (nothing landed) or the schema commit went through. For installs the
/// plugin records are then made to agree with that schema.
pub(crate) fn run_repair_command(layout: &StoreLayout) -> Result<String> {
    layout.ensure_base_dirs()?;

    let Some(txid) = read_active_transaction(layout)? else {
        return Ok("repair: no action needed".to_string());
    };

    let Some(metadata) = read_transaction_metadata(layout, &txid)? else {
        clear_active_transaction(layout)?;
        return Ok(format!("repair: cleared stale marker {txid}"));
    };
    if metadata.status.is_terminal() {
        clear_active_transaction(layout)?;
        return Ok(format!("repair: cleared stale marker {txid}"));
    }

    let database = SchemaDatabase::open(layout.clone())?;
    let current = database.schema().fingerprint()?;
    let unchanged = metadata.schema_fingerprint.as_deref() == Some(current.as_str());
    let resolved = if unchanged {
        TransactionStatus::RolledBack
    } else {
        TransactionStatus::Committed
    };

    let journal = read_transaction_journal(layout, &txid)?;
    let notes = if metadata.operation == "install" {
        let recorded = RecordedInstall::from_journal(&journal);
        reconcile_install_records(layout, &recorded, !unchanged, database.schema())?
    } else {
        Vec::new()
    };
    if !unchanged && notes.is_empty() {
        warn!(
            txid = txid.as_str(),
            "schema changed during interrupted transaction; verify plugin records"
        );
    }

    let seq = journal.last().map_or(1, |entry| entry.seq + 1);
    append_transaction_journal_entry(
        layout,
        &txid,
        &TransactionJournalEntry {
            seq,
            step: "repair".to_string(),
            state: resolved.as_str().to_string(),
            detail: Some(format!("schema_fingerprint={current}")),
        },
    )?;
    update_transaction_status(layout, &txid, resolved)?;
    clear_active_transaction(layout)?;

    let mut message = format!(
        "repair: marked {txid} {} (schema {})",
        resolved.as_str(),
        if unchanged { "unchanged" } else { "changed" }
    );
    if !notes.is_empty() {
        message.push_str(&format!("; {}", notes.join(", ")));
    }
    Ok(message)
}

pub(crate) fn doctor_lines(
    layout: &StoreLayout,
    config_path: &Path,
    shell_env: Option<&str>,
) -> Result<Vec<String>> {
    let mut lines = vec![format!("prefix: {}", layout.prefix().display())];
    let config_state = if !config_path.exists() {
        "defaults".to_string()
    } else {
        match EngineConfig::load(config_path) {
            Ok(_) => "ok".to_string(),
            Err(err) => format!("invalid ({err:#})"),
        }
    };
    lines.push(format!("config: {} ({config_state})", config_path.display()));
    lines.push(format!("schema: {}", layout.schema_path().display()));
    lines.push(format!("plugins: {}", layout.plugins_dir().display()));
    lines.push(format!("transactions: {}", layout.transactions_dir().display()));
    match detect_shell_from_env(shell_env) {
        Some(shell) => lines.push(format!(
            "completions: commerce completions {}",
            format!("{shell:?}").to_ascii_lowercase()
        )),
        None => lines.push("completions: shell not detected".to_string()),
    }
    lines.push(transaction_health_line(layout)?);
    Ok(lines)
}
