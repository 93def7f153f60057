use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use greeter::config::{self, LOG_LEVEL_ENV, PLUGIN_PATH_ENV};
use greeter::greetings::GreetingCommand;
use greeter::host::Host;
use greeter::plugin::PluginManager;
use greeter::registry::Registry;
use greeter::shutdown;

mod commands;

/// How long plugin teardown may take after a termination signal
const SHUTDOWN_WINDOW: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "greeter",
    about = "Greets you in many languages, some served by plugins",
    version,
    author,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Language to greet in
    #[arg(short, long, default_value = "english", global = true)]
    lang: String,

    /// Root directory holding plugin executables (<dir>/lang/<name>)
    #[arg(long, env = PLUGIN_PATH_ENV, global = true)]
    plugins_dir: Option<PathBuf>,

    /// Enable verbose output (use -vv for debug output)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Say hello
    Hello,

    /// Say good morning
    #[command(name = "goodmorning")]
    GoodMorning,

    /// Say good afternoon
    #[command(name = "goodafternoon")]
    GoodAfternoon,

    /// Say good night
    #[command(name = "goodnight")]
    GoodNight,

    /// Say goodbye
    #[command(name = "goodbye")]
    GoodBye,

    /// List built-in and plugin languages
    ListLanguages,
}

impl Commands {
    fn greeting(&self) -> Option<GreetingCommand> {
        match self {
            Commands::Hello => Some(GreetingCommand::Hello),
            Commands::GoodMorning => Some(GreetingCommand::GoodMorning),
            Commands::GoodAfternoon => Some(GreetingCommand::GoodAfternoon),
            Commands::GoodNight => Some(GreetingCommand::GoodNight),
            Commands::GoodBye => Some(GreetingCommand::GoodBye),
            Commands::ListLanguages => None,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let host = match build_host(cli.plugins_dir.clone()) {
        Ok(host) => Arc::new(host),
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    // Tear plugins down on Ctrl-C / SIGTERM even mid-request
    let signal_host = host.clone();
    tokio::spawn(async move {
        shutdown::termination().await;
        info!("Shutting down...");
        if tokio::time::timeout(SHUTDOWN_WINDOW, signal_host.shutdown())
            .await
            .is_err()
        {
            warn!("Plugin shutdown did not finish within {SHUTDOWN_WINDOW:?}");
        }
        std::process::exit(0);
    });

    let result = run(&cli, &host).await;
    host.shutdown().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn build_host(plugins_dir: Option<PathBuf>) -> Result<Host> {
    let plugins_dir = config::resolve_plugins_dir(plugins_dir)?;
    info!("Using plugins directory: {}", plugins_dir.display());

    Ok(Host::new(
        Arc::new(Registry::with_builtins()),
        Arc::new(PluginManager::new(plugins_dir)),
    ))
}

async fn run(cli: &Cli, host: &Host) -> Result<()> {
    match cli.command.greeting() {
        Some(command) => commands::greet_command(host, &cli.lang, command).await,
        None => commands::list_languages_command(host),
    }
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("greeter=warn"), // Default: warnings and errors only
        1 => EnvFilter::new("greeter=info"), // -v: info messages
        _ => EnvFilter::new("greeter=debug"), // -vv or more: full debug
    });

    // stdout is reserved for greetings
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
