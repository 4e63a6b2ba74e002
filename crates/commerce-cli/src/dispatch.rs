use std::io;

use anyhow::Result;
use commerce_core::EngineConfig;
use commerce_upgrade::CommercePlugin;

use crate::completion::write_completions_script;
use crate::flows::{
    doctor_lines, install_preview_lines, install_summary, parse_host_version, plan_lines,
    registry_list_lines, resolve_config_path, resolve_layout, run_install_command,
    run_locale_add_command, run_registry_add_command, run_registry_remove_command,
    run_repair_command, run_seed_legacy_command, status_lines,
};
use crate::render::TerminalRenderer;
use crate::{Cli, Commands, LocaleCommands, RegistryCommands};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let renderer = TerminalRenderer::current();

    if let Commands::Completions { shell } = cli.command {
        let mut stdout = io::stdout().lock();
        return write_completions_script(shell, &mut stdout);
    }

    let layout = resolve_layout(cli.prefix.as_deref())?;
    let config_path = resolve_config_path(&layout, cli.config.as_deref());

    match cli.command {
        Commands::Install {
            host_version,
            dry_run,
        } => {
            let config = EngineConfig::load(&config_path)?;
            let host_version = parse_host_version(&host_version)?;
            if dry_run {
                renderer.print_lines(&install_preview_lines(&layout, &config, &host_version)?);
                return Ok(());
            }
            let report = run_install_command(&layout, &config, &host_version, renderer)?;
            for line in install_summary(&report, &config) {
                renderer.print_status("ok", &line);
            }
        }
        Commands::Plan => {
            let config = EngineConfig::load(&config_path)?;
            let plugin = CommercePlugin::new(config)?;
            renderer.print_lines(&plan_lines(&plugin));
        }
        Commands::Status => {
            let config = EngineConfig::load(&config_path)?;
            renderer.print_lines(&status_lines(&layout, &config)?);
        }
        Commands::Registry(RegistryCommands::Add { name, version }) => {
            let path = run_registry_add_command(&layout, &name, &version)?;
            renderer.print_status("ok", &format!("registered {name} {version}"));
            renderer.print_status("step", &format!("record: {}", path.display()));
        }
        Commands::Registry(RegistryCommands::List) => {
            renderer.print_lines(&registry_list_lines(&layout)?);
        }
        Commands::Registry(RegistryCommands::Remove { name }) => {
            if run_registry_remove_command(&layout, &name)? {
                renderer.print_status("ok", &format!("removed {name}"));
            } else {
                renderer.print_status("warn", &format!("{name} is not registered"));
            }
        }
        Commands::Locale(LocaleCommands::Add { locale }) => {
            let config = EngineConfig::load(&config_path)?;
            let added = run_locale_add_command(&layout, &config, &locale)?;
            renderer.print_status(
                "ok",
                &format!("locale {} added to {added} product types", locale.trim()),
            );
        }
        Commands::SeedLegacy => {
            let config = EngineConfig::load(&config_path)?;
            run_seed_legacy_command(&layout, &config)?;
            renderer.print_status(
                "ok",
                &format!(
                    "seeded {} {} fixture",
                    config.legacy_product, config.upgrade_source_version
                ),
            );
        }
        Commands::Repair => {
            let message = run_repair_command(&layout)?;
            renderer.print_status("step", &message);
        }
        Commands::Doctor => {
            let shell = std::env::var("SHELL").ok();
            renderer.print_lines(&doctor_lines(&layout, &config_path, shell.as_deref())?);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
