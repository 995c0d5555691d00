//! Route listing command
//!
//! Lists the routes of the application and every enabled module, as the
//! kernel aggregates them.

use crate::error::CliResult;
use colored::Colorize;
use std::io::Write;
use trellis_core::{Application, RouteEntry};

/// List all routes command
pub fn execute(app: &Application, out: &mut dyn Write) -> CliResult<()> {
    let kernel = app.kernel()?;
    let mut routes = kernel.routes()?;
    routes.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.methods.cmp(&b.methods)));

    if routes.is_empty() {
        writeln!(out, "No routes found.")?;
        writeln!(out)?;
        writeln!(out, "Routes are declared in config/<env>/routes.toml of the")?;
        writeln!(out, "application and of each enabled module.")?;
        return Ok(());
    }

    print_routes_table(&routes, out)?;
    writeln!(out)?;
    writeln!(out, "Total routes: {}", routes.len())?;
    Ok(())
}

fn print_routes_table(routes: &[RouteEntry], out: &mut dyn Write) -> CliResult<()> {
    let methods: Vec<String> = routes.iter().map(|r| r.methods.join("|")).collect();
    let method_width = methods.iter().map(String::len).max().unwrap_or(0).max(6);
    let path_width = routes.iter().map(|r| r.path.len()).max().unwrap_or(0).max(4);

    writeln!(
        out,
        "{:<mw$}  {:<pw$}  {}",
        "METHOD".bold(),
        "PATH".bold(),
        "HANDLER".bold(),
        mw = method_width,
        pw = path_width
    )?;
    for (route, method) in routes.iter().zip(&methods) {
        writeln!(
            out,
            "{:<mw$}  {:<pw$}  {}",
            method.cyan(),
            route.path,
            route.handler.dimmed(),
            mw = method_width,
            pw = path_width
        )?;
    }
    Ok(())
}
