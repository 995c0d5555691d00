//! Module administration commands

use crate::ModuleCommands;
use crate::error::{CliError, CliResult};
use colored::Colorize;
use std::io::Write;
use trellis_core::{Application, Installer};

pub fn execute(app: &Application, command: &ModuleCommands, out: &mut dyn Write) -> CliResult<()> {
    match command {
        ModuleCommands::List { all } => list(app, *all, out),
        ModuleCommands::Enable { name } => {
            app.module_registry().enable(name)?;
            writeln!(out, "{} {}", "Enabled".green().bold(), name)?;
            Ok(())
        }
        ModuleCommands::Disable { name } => {
            app.module_registry().disable(name)?;
            writeln!(out, "{} {}", "Disabled".yellow().bold(), name)?;
            Ok(())
        }
        ModuleCommands::Install { name } => lifecycle(app, name, "install", out, |i, c| i.install(c)),
        ModuleCommands::Uninstall { name } => {
            lifecycle(app, name, "uninstall", out, |i, c| i.uninstall(c))
        }
        ModuleCommands::Update { name } => lifecycle(app, name, "update", out, |i, c| i.update(c)),
    }
}

fn list(app: &Application, all: bool, out: &mut dyn Write) -> CliResult<()> {
    let registry = app.module_registry();
    let names = registry.get_modules(!all);
    if names.is_empty() {
        writeln!(out, "No modules found in {}", registry.root().display())?;
        return Ok(());
    }

    let width = names.iter().map(String::len).max().unwrap_or(0).max(6);
    writeln!(out, "{:<width$}  {:<8}  {}", "MODULE".bold(), "STATUS".bold(), "PLUGIN".bold())?;
    for name in &names {
        let enabled = registry.exists(name, true);
        let status = if enabled {
            "enabled".green()
        } else {
            "disabled".yellow()
        };
        let plugin = if registry.plugin(name).is_some() { "yes" } else { "-" };
        writeln!(out, "{:<width$}  {:<8}  {}", name, status, plugin)?;
    }
    Ok(())
}

fn lifecycle<F>(app: &Application, name: &str, action: &str, out: &mut dyn Write, run: F) -> CliResult<()>
where
    F: FnOnce(&dyn Installer, &trellis_core::Container) -> trellis_core::Result<()>,
{
    let registry = app.module_registry();
    if !registry.exists(name, false) {
        return Err(CliError::InvalidArgument(format!("Unknown module: {}", name)));
    }
    let plugin = registry
        .plugin(name)
        .ok_or_else(|| CliError::Command(format!("Module {} is not compiled into this binary", name)))?;
    let Some(installer) = plugin.installer() else {
        writeln!(out, "Module {} has no installer; nothing to {}", name, action)?;
        return Ok(());
    };

    let kernel = app.kernel()?;
    run(installer.as_ref(), kernel.container())?;
    writeln!(out, "{} {} {}", "Ran".green().bold(), action, name)?;
    Ok(())
}
