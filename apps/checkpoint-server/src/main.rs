use anyhow::Result;
use clap::Parser;
use tracing::info;

use checkpoint_server::cli::{Cli, Command, ServerConfig};
use checkpoint_server::telemetry::Telemetry;
use checkpoint_server::{server, validate};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let telemetry = Telemetry::init(args.log_level)?;
            let config = ServerConfig::try_from(args)?;
            info!(
                listen_addr = %config.listen_addr,
                user = %config.user,
                workdir = %config.workdir.display(),
                "starting checkpoint server"
            );
            server::run(config, &telemetry).await
        }
        Command::Validate(args) => validate::run(&args.config, args.mission),
    }
}
