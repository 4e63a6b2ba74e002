use super::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::error::ErrorKind;
use clap::Parser;
use commerce_core::{EngineConfig, PLUGIN_NAME, SCHEMA_VERSION};
use commerce_store::{
    append_transaction_journal_entry, read_transaction_journal, read_transaction_metadata,
    set_active_transaction, write_transaction_metadata, FilePluginRegistry, PluginRegistry,
    SchemaDatabase, SchemaStorage, StoreLayout, TransactionJournalEntry, TransactionMetadata,
    TransactionStatus,
};
use commerce_upgrade::{
    base_schema, market_legacy_schema, CommercePlugin, SchemaPath, MARKET_UPGRADE_STEPS,
};
use semver::Version;

use crate::completion::{detect_shell_from_env, write_completions_script};
use crate::flows::{
    doctor_lines, ensure_no_active_transaction_for, install_preview_lines, install_summary,
    parse_host_version, plan_lines, registry_list_lines, run_install_command,
    run_locale_add_command, run_registry_add_command, run_registry_remove_command,
    run_repair_command, run_seed_legacy_command, status_lines, step_panics_quiet,
    transaction_health_line, with_quiet_step_panics,
};
use crate::render::{render_status_line, resolve_output_style, OutputStyle, TerminalRenderer};

static TEST_LAYOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_layout() -> StoreLayout {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "commerce-cli-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        TEST_LAYOUT_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    StoreLayout::new(path)
}

fn plain() -> TerminalRenderer {
    TerminalRenderer::from_style(OutputStyle::Plain)
}

fn host() -> Version {
    Version::new(2, 5, 0)
}

fn transaction_ids(layout: &StoreLayout) -> Vec<String> {
    let mut ids: Vec<String> = fs::read_dir(layout.transactions_dir())
        .expect("must read transactions dir")
        .filter_map(|entry| {
            let path = entry.expect("must read entry").path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                return None;
            }
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .map(ToOwned::to_owned)
        })
        .collect();
    ids.sort();
    ids
}

fn persisted_table_names(layout: &StoreLayout) -> Vec<String> {
    SchemaDatabase::open(layout.clone())
        .expect("must open schema")
        .schema()
        .table_names()
        .map(ToOwned::to_owned)
        .collect()
}

fn write_metadata(layout: &StoreLayout, txid: &str, status: TransactionStatus, fingerprint: &str) {
    write_transaction_metadata(
        layout,
        &TransactionMetadata {
            version: 1,
            txid: txid.to_string(),
            operation: "install".to_string(),
            status,
            started_at_unix: 1_771_001_234,
            schema_fingerprint: Some(fingerprint.to_string()),
        },
    )
    .expect("must write metadata");
}

fn cleanup(layout: &StoreLayout) {
    let _ = fs::remove_dir_all(layout.prefix());
}

#[test]
fn install_command_parses_host_version_and_dry_run() {
    let cli = Cli::try_parse_from([
        "commerce",
        "install",
        "--host-version",
        "2.5.2760",
        "--dry-run",
    ])
    .expect("command must parse");

    match cli.command {
        Commands::Install {
            host_version,
            dry_run,
        } => {
            assert_eq!(host_version, "2.5.2760");
            assert!(dry_run);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn install_command_requires_host_version() {
    let err = Cli::try_parse_from(["commerce", "install"]).expect_err("must require host version");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn global_prefix_is_accepted_after_subcommand() {
    let cli = Cli::try_parse_from([
        "commerce",
        "registry",
        "add",
        "Market",
        "0.8.09",
        "--prefix",
        "/tmp/commerce-prefix",
    ])
    .expect("command must parse");

    assert_eq!(
        cli.prefix.as_deref(),
        Some(Path::new("/tmp/commerce-prefix"))
    );
    match cli.command {
        Commands::Registry(RegistryCommands::Add { name, version }) => {
            assert_eq!(name, "Market");
            assert_eq!(version, "0.8.09");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn locale_and_completion_commands_parse() {
    let cli = Cli::try_parse_from(["commerce", "locale", "add", "fr"]).expect("must parse");
    assert!(matches!(
        cli.command,
        Commands::Locale(LocaleCommands::Add { ref locale }) if locale == "fr"
    ));

    let cli = Cli::try_parse_from(["commerce", "completions", "zsh"]).expect("must parse");
    assert!(matches!(
        cli.command,
        Commands::Completions {
            shell: CliCompletionShell::Zsh
        }
    ));

    let err = Cli::try_parse_from(["commerce", "completions", "tcsh"]).expect_err("must reject");
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn parse_host_version_accepts_two_part_versions() {
    assert_eq!(
        parse_host_version("2.5").expect("must parse"),
        Version::new(2, 5, 0)
    );
    assert_eq!(
        parse_host_version(" 2.5.2760 ").expect("must parse"),
        Version::new(2, 5, 2760)
    );
    let err = parse_host_version("craft").expect_err("must reject");
    assert_eq!(err.to_string(), "invalid host version 'craft'");
}

#[test]
fn status_lines_render_plainly_without_terminal() {
    assert_eq!(resolve_output_style(false, false), OutputStyle::Plain);
    assert_eq!(resolve_output_style(true, true), OutputStyle::Plain);
    assert_eq!(resolve_output_style(true, false), OutputStyle::Rich);

    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "installed Commerce"),
        "ok: installed Commerce"
    );
    let rich = render_status_line(OutputStyle::Rich, "ok", "installed Commerce");
    assert!(rich.contains("installed Commerce"));
    assert!(rich.contains("\u{1b}["));
}

#[test]
fn detect_shell_from_env_reads_basename() {
    assert_eq!(
        detect_shell_from_env(Some("/usr/bin/zsh")),
        Some(CliCompletionShell::Zsh)
    );
    assert_eq!(
        detect_shell_from_env(Some("pwsh")),
        Some(CliCompletionShell::Powershell)
    );
    assert_eq!(detect_shell_from_env(Some("/bin/tcsh")), None);
    assert_eq!(detect_shell_from_env(None), None);
}

#[test]
fn completions_script_names_binary_and_subcommands() {
    let mut output = Vec::new();
    write_completions_script(CliCompletionShell::Bash, &mut output)
        .expect("must write completions");
    let script = String::from_utf8(output).expect("completions must be utf-8");
    assert!(script.contains("commerce"));
    assert!(script.contains("seed-legacy"));
}

#[test]
fn plan_lines_number_steps_in_execution_order() {
    let plugin = CommercePlugin::new(EngineConfig::default()).expect("must build plugin");
    let lines = plan_lines(&plugin);
    assert_eq!(lines.len(), MARKET_UPGRADE_STEPS.len());
    assert_eq!(lines[0], " 1. m150916_010101_Commerce_Rename");
    assert!(lines[21].starts_with("22. "));
}

#[test]
fn fresh_install_creates_schema_and_writes_plugin_record() {
    let layout = test_layout();
    let config = EngineConfig::default();

    let report =
        run_install_command(&layout, &config, &host(), plain()).expect("must install");
    assert_eq!(report.outcome.path, SchemaPath::FreshInstall);
    assert!(report.seeded);

    let registry = FilePluginRegistry::new(layout.clone());
    let record = registry
        .find_installed_product(PLUGIN_NAME)
        .expect("must read registry")
        .expect("Commerce must be registered");
    assert_eq!(record.schema_version.as_deref(), Some(SCHEMA_VERSION));
    assert!(record.installed_at_unix > 0);

    assert!(persisted_table_names(&layout).contains(&"commerce_orders".to_string()));
    assert!(!layout.transaction_active_path().exists());

    let txids = transaction_ids(&layout);
    assert_eq!(txids.len(), 1);
    let metadata = read_transaction_metadata(&layout, &txids[0])
        .expect("must read metadata")
        .expect("metadata must exist");
    assert_eq!(metadata.status, TransactionStatus::Committed);
    let steps: Vec<String> = read_transaction_journal(&layout, &txids[0])
        .expect("must read journal")
        .into_iter()
        .map(|entry| entry.step)
        .collect();
    assert_eq!(
        steps,
        vec![
            "ensure_schema",
            "seed_defaults",
            "write_plugin_record",
            "commit_schema"
        ]
    );

    assert_eq!(
        install_summary(&report, &config),
        vec![
            "created Commerce base schema".to_string(),
            "seeded default records".to_string(),
            format!("installed Commerce 1.0.0000 (schema {SCHEMA_VERSION})"),
        ]
    );

    cleanup(&layout);
}

#[test]
fn install_upgrades_seeded_legacy_store_and_retires_market_record() {
    let layout = test_layout();
    let config = EngineConfig::default();
    run_seed_legacy_command(&layout, &config).expect("must seed legacy fixture");

    let report =
        run_install_command(&layout, &config, &host(), plain()).expect("must upgrade");
    match &report.outcome.path {
        SchemaPath::Upgraded {
            from_version,
            applied,
        } => {
            assert_eq!(from_version, "0.8.09");
            assert_eq!(applied.len(), MARKET_UPGRADE_STEPS.len());
        }
        other => panic!("unexpected path: {other:?}"),
    }
    assert!(!report.seeded);

    let tables = persisted_table_names(&layout);
    assert!(tables.iter().all(|name| name.starts_with("commerce_")));
    assert!(tables.contains(&"commerce_customers_addresses".to_string()));

    let registry = FilePluginRegistry::new(layout.clone());
    assert!(registry
        .find_installed_product("Market")
        .expect("must read registry")
        .is_none());
    assert!(registry
        .find_installed_product(PLUGIN_NAME)
        .expect("must read registry")
        .is_some());

    let txids = transaction_ids(&layout);
    let journal = read_transaction_journal(&layout, &txids[0]).expect("must read journal");
    let step_entries = journal
        .iter()
        .filter(|entry| entry.step.starts_with("step:"))
        .count();
    assert_eq!(step_entries, MARKET_UPGRADE_STEPS.len());
    assert_eq!(
        journal.last().map(|entry| entry.step.as_str()),
        Some("commit_schema")
    );
    let seqs: Vec<u64> = journal.iter().map(|entry| entry.seq).collect();
    let expected: Vec<u64> = (1..=journal.len() as u64).collect();
    assert_eq!(seqs, expected);

    cleanup(&layout);
}

#[test]
fn install_refuses_when_commerce_already_registered() {
    let layout = test_layout();
    let config = EngineConfig::default();
    run_install_command(&layout, &config, &host(), plain()).expect("must install");

    let err = run_install_command(&layout, &config, &host(), plain())
        .expect_err("second install must fail");
    assert_eq!(err.to_string(), "Commerce 1.0.0000 is already installed");
    assert_eq!(transaction_ids(&layout).len(), 1);

    cleanup(&layout);
}

#[test]
fn unsupported_market_version_releases_marker_and_keeps_schema() {
    let layout = test_layout();
    let config = EngineConfig::default();
    run_seed_legacy_command(&layout, &config).expect("must seed legacy fixture");
    run_registry_add_command(&layout, "Market", "0.8.10").expect("must overwrite record");
    let before = fs::read(layout.schema_path()).expect("must read schema");

    let err = run_install_command(&layout, &config, &host(), plain())
        .expect_err("unsupported source must fail");
    assert_eq!(
        err.to_string(),
        "Market plugin must be upgraded to 0.8.09 before installing Commerce (found 0.8.10)"
    );

    assert_eq!(fs::read(layout.schema_path()).expect("must read schema"), before);
    assert!(!layout.transaction_active_path().exists());
    let txids = transaction_ids(&layout);
    let metadata = read_transaction_metadata(&layout, &txids[0])
        .expect("must read metadata")
        .expect("metadata must exist");
    assert_eq!(metadata.status, TransactionStatus::RolledBack);
    assert_eq!(transaction_health_line(&layout).expect("health"), "transaction: clean");

    cleanup(&layout);
}

#[test]
fn host_too_old_is_rejected_before_any_write() {
    let layout = test_layout();
    let config = EngineConfig::default();

    let err = run_install_command(&layout, &config, &Version::new(2, 4, 9), plain())
        .expect_err("old host must fail");
    assert!(err.to_string().contains("requires host version >=2.5"));
    assert!(!layout.schema_path().exists());
    assert!(FilePluginRegistry::new(layout.clone())
        .read_records()
        .expect("must read registry")
        .is_empty());

    cleanup(&layout);
}

#[test]
fn install_preview_reports_path_without_writing() {
    let layout = test_layout();
    let config = EngineConfig::default();

    let fresh = install_preview_lines(&layout, &config, &host()).expect("must preview");
    assert_eq!(fresh[1], "path: fresh install");
    assert!(!layout.schema_path().exists());

    run_seed_legacy_command(&layout, &config).expect("must seed legacy fixture");
    let upgrade = install_preview_lines(&layout, &config, &host()).expect("must preview");
    assert_eq!(upgrade[1], "path: upgrade Market 0.8.09 (22 steps)");
    assert_eq!(upgrade[2], "seed: skipped");
    assert!(transaction_ids(&layout).is_empty());

    cleanup(&layout);
}

#[test]
fn active_transaction_blocks_install_with_reason() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    write_metadata(&layout, "tx-blocking", TransactionStatus::Applying, "abc");
    set_active_transaction(&layout, "tx-blocking").expect("must set marker");

    let err = ensure_no_active_transaction_for(&layout, "  Install ")
        .expect_err("active transaction must block");
    assert_eq!(
        err.to_string(),
        "cannot install (reason=active_transaction command=install): transaction tx-blocking is active (reason=active_status status=applying)"
    );

    let err = run_install_command(&layout, &EngineConfig::default(), &host(), plain())
        .expect_err("install must be blocked");
    assert!(err
        .to_string()
        .starts_with("cannot install (reason=active_transaction command=install)"));
    assert_eq!(
        transaction_health_line(&layout).expect("health"),
        "transaction: active tx-blocking (operation=install status=applying)"
    );

    cleanup(&layout);
}

#[test]
fn terminal_marker_is_cleared_by_guard() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    write_metadata(&layout, "tx-done", TransactionStatus::Committed, "abc");
    set_active_transaction(&layout, "tx-done").expect("must set marker");

    ensure_no_active_transaction_for(&layout, "").expect("terminal marker must not block");
    assert!(!layout.transaction_active_path().exists());

    cleanup(&layout);
}

#[test]
fn repair_without_marker_needs_no_action() {
    let layout = test_layout();
    assert_eq!(
        run_repair_command(&layout).expect("must repair"),
        "repair: no action needed"
    );
    cleanup(&layout);
}

#[test]
fn repair_clears_marker_without_metadata() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    set_active_transaction(&layout, "tx-orphan").expect("must set marker");
    assert_eq!(
        transaction_health_line(&layout).expect("health"),
        format!(
            "transaction: failed tx-orphan (reason=metadata_missing path={})",
            layout.transaction_metadata_path("tx-orphan").display()
        )
    );

    assert_eq!(
        run_repair_command(&layout).expect("must repair"),
        "repair: cleared stale marker tx-orphan"
    );
    assert!(!layout.transaction_active_path().exists());

    cleanup(&layout);
}

#[test]
fn repair_marks_unchanged_schema_rolled_back() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    let fingerprint = SchemaDatabase::open(layout.clone())
        .expect("must open schema")
        .schema()
        .fingerprint()
        .expect("must fingerprint");
    write_metadata(&layout, "tx-failed", TransactionStatus::Failed, &fingerprint);
    set_active_transaction(&layout, "tx-failed").expect("must set marker");
    assert_eq!(
        transaction_health_line(&layout).expect("health"),
        "transaction: failed tx-failed (reason=failed)"
    );

    assert_eq!(
        run_repair_command(&layout).expect("must repair"),
        "repair: marked tx-failed rolled_back (schema unchanged)"
    );
    let metadata = read_transaction_metadata(&layout, "tx-failed")
        .expect("must read metadata")
        .expect("metadata must exist");
    assert_eq!(metadata.status, TransactionStatus::RolledBack);
    let journal = read_transaction_journal(&layout, "tx-failed").expect("must read journal");
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].step, "repair");
    assert_eq!(journal[0].state, "rolled_back");
    assert_eq!(transaction_health_line(&layout).expect("health"), "transaction: clean");

    cleanup(&layout);
}

#[test]
fn repair_marks_changed_schema_committed() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    write_metadata(&layout, "tx-landed", TransactionStatus::Applying, "stale-fingerprint");
    set_active_transaction(&layout, "tx-landed").expect("must set marker");

    let mut database = SchemaDatabase::open(layout.clone()).expect("must open schema");
    *database.schema_mut() = market_legacy_schema().expect("must build fixture");
    database.autocommit().expect("must persist");

    assert_eq!(
        run_repair_command(&layout).expect("must repair"),
        "repair: marked tx-landed committed (schema changed)"
    );
    let metadata = read_transaction_metadata(&layout, "tx-landed")
        .expect("must read metadata")
        .expect("metadata must exist");
    assert_eq!(metadata.status, TransactionStatus::Committed);
    assert!(!layout.transaction_active_path().exists());

    cleanup(&layout);
}

#[test]
fn locale_add_localises_installed_product_types() {
    let layout = test_layout();
    let config = EngineConfig::default();

    let err = run_locale_add_command(&layout, &config, "fr").expect_err("must require install");
    assert_eq!(err.to_string(), "Commerce is not installed");

    run_seed_legacy_command(&layout, &config).expect("must seed legacy fixture");
    run_install_command(&layout, &config, &host(), plain()).expect("must upgrade");

    assert_eq!(
        run_locale_add_command(&layout, &config, "fr").expect("must add locale"),
        2
    );
    assert_eq!(
        run_locale_add_command(&layout, &config, "fr").expect("must add locale"),
        0
    );
    let err = run_locale_add_command(&layout, &config, "  ").expect_err("blank must fail");
    assert!(format!("{err:#}").contains("locale must not be empty"));

    cleanup(&layout);
}

#[test]
fn seed_legacy_refuses_populated_schema() {
    let layout = test_layout();
    let config = EngineConfig::default();
    run_seed_legacy_command(&layout, &config).expect("must seed legacy fixture");

    let err = run_seed_legacy_command(&layout, &config).expect_err("must refuse");
    assert_eq!(
        err.to_string(),
        "cannot seed legacy fixture: schema already has 14 tables"
    );

    cleanup(&layout);
}

#[test]
fn registry_commands_add_list_and_remove_records() {
    let layout = test_layout();
    assert_eq!(
        registry_list_lines(&layout).expect("must list"),
        vec!["No plugins registered".to_string()]
    );

    run_registry_add_command(&layout, "Market", " 0.8.09 ").expect("must add");
    assert_eq!(
        registry_list_lines(&layout).expect("must list"),
        vec!["Market 0.8.09".to_string()]
    );
    assert!(run_registry_remove_command(&layout, "Market").expect("must remove"));
    assert!(!run_registry_remove_command(&layout, "Market").expect("must remove"));

    cleanup(&layout);
}

#[test]
fn status_and_doctor_report_store_state() {
    let layout = test_layout();
    let config = EngineConfig::default();
    run_seed_legacy_command(&layout, &config).expect("must seed legacy fixture");

    let status = status_lines(&layout, &config).expect("must report status");
    assert!(status[1].starts_with("schema: 14 tables (fingerprint "));
    assert_eq!(status[2], "plugin: Commerce not installed");
    assert_eq!(status[3], "legacy: Market 0.8.09 (upgradable)");
    assert_eq!(status[4], "transaction: clean");

    let doctor = doctor_lines(&layout, &layout.config_path(), Some("/bin/bash"))
        .expect("must report doctor");
    assert_eq!(
        doctor[1],
        format!("config: {} (defaults)", layout.config_path().display())
    );
    assert!(doctor.contains(&"completions: commerce completions bash".to_string()));
    assert_eq!(doctor.last().map(String::as_str), Some("transaction: clean"));

    cleanup(&layout);
}

fn append_journal(layout: &StoreLayout, txid: &str, entries: &[(&str, Option<&str>)]) {
    for (index, (step, detail)) in entries.iter().enumerate() {
        append_transaction_journal_entry(
            layout,
            txid,
            &TransactionJournalEntry {
                seq: index as u64 + 1,
                step: step.to_string(),
                state: "done".to_string(),
                detail: detail.map(ToOwned::to_owned),
            },
        )
        .expect("must append journal entry");
    }
}

#[cfg(unix)]
#[test]
fn failed_record_write_leaves_legacy_store_retryable() {
    let layout = test_layout();
    let config = EngineConfig::default();
    run_seed_legacy_command(&layout, &config).expect("must seed legacy fixture");
    let before = fs::read(layout.schema_path()).expect("must read schema");

    let record_path = layout.plugin_record_path(PLUGIN_NAME);
    let missing_target = layout.prefix().join("missing").join("Commerce.plugin");
    std::os::unix::fs::symlink(&missing_target, &record_path).expect("must create symlink");

    let err = run_install_command(&layout, &config, &host(), plain())
        .expect_err("record write must fail");
    assert!(format!("{err:#}").contains("failed to write plugin record"));

    assert_eq!(fs::read(layout.schema_path()).expect("must read schema"), before);
    assert!(!layout.transaction_active_path().exists());
    let txids = transaction_ids(&layout);
    let metadata = read_transaction_metadata(&layout, &txids[0])
        .expect("must read metadata")
        .expect("metadata must exist");
    assert_eq!(metadata.status, TransactionStatus::RolledBack);
    assert_eq!(
        run_repair_command(&layout).expect("must repair"),
        "repair: no action needed"
    );

    let status = status_lines(&layout, &config).expect("must report status");
    assert_eq!(status[2], "plugin: Commerce not installed");
    assert_eq!(status[3], "legacy: Market 0.8.09 (upgradable)");

    fs::remove_file(&record_path).expect("must remove symlink");
    let report =
        run_install_command(&layout, &config, &host(), plain()).expect("retry must upgrade");
    assert!(report.outcome.is_upgrade());
    let status = status_lines(&layout, &config).expect("must report status");
    assert!(status[2].starts_with("plugin: Commerce 1.0.0000"));
    assert_eq!(status[3], "legacy: Market not installed");

    cleanup(&layout);
}

#[test]
fn repair_completes_records_after_committed_upgrade() {
    let layout = test_layout();
    let config = EngineConfig::default();
    run_seed_legacy_command(&layout, &config).expect("must seed legacy fixture");
    let legacy_fingerprint = market_legacy_schema()
        .expect("must build fixture")
        .fingerprint()
        .expect("must fingerprint");
    write_metadata(&layout, "tx-upgrade", TransactionStatus::Failed, &legacy_fingerprint);
    append_journal(
        &layout,
        "tx-upgrade",
        &[("ensure_schema", Some("upgrade:Market:0.8.09"))],
    );
    set_active_transaction(&layout, "tx-upgrade").expect("must set marker");

    let mut database = SchemaDatabase::open(layout.clone()).expect("must open schema");
    *database.schema_mut() = base_schema();
    database.autocommit().expect("must persist");

    assert_eq!(
        run_repair_command(&layout).expect("must repair"),
        "repair: marked tx-upgrade committed (schema changed); wrote Commerce record, removed Market record"
    );
    let status = status_lines(&layout, &config).expect("must report status");
    assert!(status[2].starts_with("plugin: Commerce 1.0.0000"));
    assert_eq!(status[3], "legacy: Market not installed");
    assert_eq!(status[4], "transaction: clean");

    let err = run_install_command(&layout, &config, &host(), plain())
        .expect_err("Commerce is installed now");
    assert_eq!(err.to_string(), "Commerce 1.0.0000 is already installed");

    cleanup(&layout);
}

#[test]
fn repair_restores_records_when_schema_never_landed() {
    let layout = test_layout();
    let config = EngineConfig::default();
    run_seed_legacy_command(&layout, &config).expect("must seed legacy fixture");
    let fingerprint = SchemaDatabase::open(layout.clone())
        .expect("must open schema")
        .schema()
        .fingerprint()
        .expect("must fingerprint");
    write_metadata(&layout, "tx-partial", TransactionStatus::Applying, &fingerprint);
    append_journal(
        &layout,
        "tx-partial",
        &[
            ("ensure_schema", Some("upgrade:Market:0.8.09")),
            ("write_plugin_record", Some(PLUGIN_NAME)),
            ("remove_legacy_record", Some("Market")),
        ],
    );
    set_active_transaction(&layout, "tx-partial").expect("must set marker");
    let registry = FilePluginRegistry::new(layout.clone());
    registry
        .write_record(&commerce_core::InstalledProductRecord::new(PLUGIN_NAME, "1.0.0000"))
        .expect("must write record");
    registry.remove_record("Market").expect("must remove record");

    assert_eq!(
        run_repair_command(&layout).expect("must repair"),
        "repair: marked tx-partial rolled_back (schema unchanged); removed Commerce record, restored Market 0.8.09 record"
    );
    let status = status_lines(&layout, &config).expect("must report status");
    assert_eq!(status[2], "plugin: Commerce not installed");
    assert_eq!(status[3], "legacy: Market 0.8.09 (upgradable)");

    let report =
        run_install_command(&layout, &config, &host(), plain()).expect("retry must upgrade");
    assert!(report.outcome.is_upgrade());

    cleanup(&layout);
}

#[test]
fn quiet_step_panics_flag_is_scoped_to_the_run() {
    assert!(!step_panics_quiet());
    let seen = with_quiet_step_panics(step_panics_quiet);
    assert!(seen);
    assert!(!step_panics_quiet());

    let unwound = std::panic::catch_unwind(|| {
        with_quiet_step_panics(|| panic!("step blew up"));
    });
    assert!(unwound.is_err());
    assert!(!step_panics_quiet());
}
