//! Trellis CLI - run and administer a Trellis application.
//!
//! # Commands
//!
//! - `trellis serve` - Run the HTTP server
//! - `trellis modules list [--all]` - List modules and their state
//! - `trellis modules enable|disable <name>` - Toggle a module
//! - `trellis modules install|uninstall|update <name>` - Run a module's installer
//! - `trellis routes` - List every route of the application and its modules
//! - `trellis exec -- <args...>` - Run a command line through the kernel
//!
//! Applications that compile in their own handlers and modules reuse the
//! runner from their own binary:
//!
//! ```no_run
//! fn main() -> std::process::ExitCode {
//!     trellis_cli::main_with(|builder| builder.environment("production"))
//! }
//! ```

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use trellis_core::{Application, ApplicationBuilder};
use trellis_log::{LogConfig, LogFormat, LogLevel, LogOutput};

pub mod commands;
pub mod error;

pub use error::{CliError, CliResult};

/// Trellis CLI - request kernel tools
#[derive(Debug, Parser)]
#[command(name = "trellis")]
#[command(version)]
#[command(about = "Run and administer a Trellis application")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Application root (must contain a config/ directory)
    #[arg(long, global = true, env = "TRELLIS_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Environment name; detected from TRELLIS_ENV and .env when omitted
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// Modules root, relative to the application root
    #[arg(long, global = true)]
    pub modules_root: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    #[command(alias = "s", visible_alias = "start")]
    Serve(ServeArgs),

    /// Inspect and administer modules
    #[command(alias = "m")]
    Modules {
        #[command(subcommand)]
        command: ModuleCommands,
    },

    /// List all routes of the application and its enabled modules
    #[command(alias = "r")]
    Routes,

    /// Run a command line through the kernel's command handler
    Exec {
        /// Arguments passed to the command handler
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short, long, env = "TRELLIS_ADDR", default_value = "127.0.0.1:8080")]
    pub addr: SocketAddr,
}

#[derive(Debug, Subcommand)]
pub enum ModuleCommands {
    /// List modules
    #[command(alias = "ls")]
    List {
        /// Include disabled and unrecognised modules
        #[arg(short, long)]
        all: bool,
    },
    /// Remove a module's disable marker
    Enable { name: String },
    /// Create a module's disable marker
    Disable { name: String },
    /// Run a module's install hook
    Install { name: String },
    /// Run a module's uninstall hook
    Uninstall { name: String },
    /// Run a module's update hook
    Update { name: String },
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let level = if self.quiet {
            LogLevel::Error
        } else if self.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };
        LogConfig::new()
            .level(level)
            .format(LogFormat::Compact)
            .output(LogOutput::Stderr)
            .with_colors(!self.no_color)
            .with_targets(self.verbose)
    }

    /// Application builder for the selected root, environment and modules root.
    pub fn builder(&self) -> ApplicationBuilder {
        let mut builder = Application::builder(&self.root);
        if let Some(env) = &self.env {
            builder = builder.environment(env);
        }
        if let Some(modules) = &self.modules_root {
            builder = builder.modules_root(modules);
        }
        builder
    }
}

/// Parse the process arguments, build the application and run the command.
pub fn main_with<F>(configure: F) -> ExitCode
where
    F: FnOnce(ApplicationBuilder) -> ApplicationBuilder,
{
    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }
    if let Err(e) = cli.log_config().init() {
        eprintln!("{} {}", "warning:".yellow().bold(), e);
    }

    let result = configure(cli.builder())
        .build()
        .map_err(CliError::from)
        .and_then(|app| run(&cli, Arc::new(app), &mut io::stdout().lock()));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Run a parsed command against `app`, writing human output to `out`.
pub fn run(cli: &Cli, app: Arc<Application>, out: &mut dyn Write) -> CliResult<()> {
    match &cli.command {
        Commands::Serve(args) => commands::serve::execute(app, args.addr),
        Commands::Modules { command } => commands::modules::execute(&app, command, out),
        Commands::Routes => commands::routes::execute(&app, out),
        Commands::Exec { args } => commands::exec::execute(&app, args, out),
    }
}
