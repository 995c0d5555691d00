//! HTTP server command

use crate::error::{CliError, CliResult};
use colored::Colorize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use trellis_core::Application;
use trellis_core::server::serve_listener;

/// Serve the application until Ctrl+C.
pub fn execute(app: Arc<Application>, addr: SocketAddr) -> CliResult<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = TcpListener::bind(addr).await?;
        println!(
            "{} http://{} ({})",
            "Listening on".bright_green().bold(),
            listener.local_addr()?,
            app.environment()
        );
        serve_listener(app, listener, async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
        Ok::<(), CliError>(())
    })
}
