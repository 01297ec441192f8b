//! The decoy binary: `decoy host` or `decoy join <ticket>`.

use clap::Parser;
use decoy_app::{AppError, ClientSession, HostSession, input, remember_profile};
use decoy_config::{AppDirs, CliArgs, Command, Config, FileSettingsStore};
use decoy_net::PeerTicket;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "Session failed");
        eprintln!("decoy: {e}");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<(), AppError> {
    let dirs = match &args.config {
        Some(root) => AppDirs::with_root(root),
        None => AppDirs::resolve()?,
    };
    dirs.create_all()?;

    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(&args);
    let mut settings = FileSettingsStore::open(&dirs.config_dir)?;
    remember_profile(&mut config, args.name.is_some(), &mut settings)?;
    decoy_log::init_logging(Some(&dirs.log_dir), config.debug.file_logging, Some(&config));
    tracing::debug!(
        config = %dirs.config_dir.display(),
        data = %dirs.data_dir.display(),
        "Directories"
    );

    let lines = input::spawn_stdin_reader();
    println!("{}", input::HELP);

    match &args.command {
        Command::Host => {
            let session = HostSession::open(&config, &dirs.data_dir).await?;
            println!("Players join with: decoy join {}", session.ticket());
            let state = session.run(lines).await?;
            tracing::info!(stage = %state.stage, players = state.players.len(), "Game closed");
        }
        Command::Join { ticket } => {
            let ticket: PeerTicket = ticket.parse()?;
            let session = ClientSession::join(&config, &ticket).await?;
            session.run(lines).await?;
        }
    }
    Ok(())
}
