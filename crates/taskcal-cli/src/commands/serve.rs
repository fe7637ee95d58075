use clap::Args;
use taskcal_core::server::{self, AppState};
use taskcal_core::Config;

use super::{connect, runtime, CliResult};

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (defaults to `server.bind`)
    #[arg(long)]
    pub bind: Option<String>,
}

/// Run the HTTP API until Ctrl-C.
pub fn run(args: ServeArgs) -> CliResult {
    let config = Config::load()?;
    let bind = args.bind.unwrap_or(config.server.bind.clone());
    let remote = connect(&config)?;
    let state = AppState::new(remote.api, remote.session);

    runtime()?.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        println!("listening on http://{}", listener.local_addr()?);
        server::serve(listener, state, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("failed to listen for ctrl-c: {e}");
            }
        })
        .await
    })?;
    Ok(())
}
