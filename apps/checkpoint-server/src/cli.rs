use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::bridge::{BridgeConfig, EchoPolicy};
use crate::telemetry::LogLevel;
use crate::workspace::WaitPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "/checkpoint/config.json";

#[derive(Parser, Debug)]
#[command(name = "checkpoint-server", author, version)]
#[command(about = "Browser terminal sessions with mission tracking")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the terminal session server
    Serve(ServeArgs),
    /// Check candidate text against one mission's listener
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Port for HTTP and websocket traffic.
    #[arg(long, env = "CHECKPOINT_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Address to bind the listener to.
    #[arg(long, env = "CHECKPOINT_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Account the session program runs as.
    #[arg(long, env = "CHECKPOINT_USER")]
    pub user: String,

    /// Working directory of the session; grading artifacts live beneath it.
    #[arg(long, env = "CHECKPOINT_WORKDIR")]
    pub workdir: PathBuf,

    /// Mission configuration file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "CHECKPOINT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Directory of front-end assets served at `/`.
    #[arg(long, env = "CHECKPOINT_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Quiet period before buffered output becomes an event.
    #[arg(long, default_value_t = 200)]
    pub debounce_ms: u64,

    /// How many times to look for the working directory before giving up.
    #[arg(long, default_value_t = 10)]
    pub workdir_attempts: u32,

    #[arg(long, default_value_t = 1000)]
    pub workdir_backoff_ms: u64,

    /// Echo heuristics to turn off (repeatable).
    #[arg(long = "disable-echo-heuristic", value_enum)]
    pub disabled_echo: Vec<EchoHeuristic>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Mission number, starting at 1.
    pub mission: usize,

    #[arg(long, env = "CHECKPOINT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EchoHeuristic {
    /// Output equal to the last keystroke
    Keystroke,
    /// Output equal to the command typed so far
    Pending,
    /// Output ending with the last keystroke
    Suffix,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub user: String,
    pub workdir: PathBuf,
    pub config_path: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub bridge: BridgeConfig,
    pub workdir_wait: WaitPolicy,
}

impl TryFrom<ServeArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServeArgs) -> Result<Self, Self::Error> {
        let ip: IpAddr = args
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: {}", args.bind))?;
        if args.user.trim().is_empty() {
            bail!("--user must not be empty");
        }
        if args.debounce_ms == 0 {
            bail!("--debounce-ms must be greater than zero");
        }
        if !args.workdir.is_absolute() {
            bail!("--workdir must be an absolute path: {}", args.workdir.display());
        }

        let mut echo = EchoPolicy::default();
        for heuristic in &args.disabled_echo {
            match heuristic {
                EchoHeuristic::Keystroke => echo.last_keystroke = false,
                EchoHeuristic::Pending => echo.pending_command = false,
                EchoHeuristic::Suffix => echo.keystroke_suffix = false,
            }
        }

        Ok(ServerConfig {
            listen_addr: SocketAddr::new(ip, args.port),
            user: args.user,
            workdir: args.workdir,
            config_path: args.config,
            static_dir: args.static_dir,
            bridge: BridgeConfig {
                debounce: Duration::from_millis(args.debounce_ms),
                echo,
            },
            workdir_wait: WaitPolicy {
                attempts: args.workdir_attempts,
                backoff: Duration::from_millis(args.workdir_backoff_ms),
            },
        })
    }
}
