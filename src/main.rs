//! Binary entry point. Without a subcommand it runs the controller TUI; the
//! controller starts this same executable in `display` mode for each
//! projection window.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use choir_projector::logging::{init_logger, Role};
use choir_projector::projection::{display, HostScreens, ProcessHost, ScreenList};
use choir_projector::{ensure_schema, run_app, seed_demo_songs, App, Config, ProjectionController};

#[derive(Parser)]
#[command(name = "choir-projector", about = "Project song lyrics verse by verse onto a second screen")]
struct Cli {
    /// SQLite song store to use instead of the configured one
    #[arg(long, global = true)]
    database: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run a projection display connected to a controller (started by the controller)
    #[command(hide = true)]
    Display {
        /// IPC server name handed out by the controller
        server: String,
    },
    /// List the screens a projection can be placed on
    Screens,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(database) = cli.database {
        config.database = Some(database);
    }

    match cli.command {
        None => run_controller(config),
        Some(Cmd::Display { server }) => {
            init_logger(&config, Role::Display)?;
            display::run(&server)
        }
        Some(Cmd::Screens) => {
            let screens = ScreenList::new(HostScreens::new(config.screen.clone()));
            for screen in screens.screens() {
                println!("{screen}");
            }
            Ok(())
        }
    }
}

/// Bring up the song store and the projection host, then drive the TUI until
/// the user exits.
fn run_controller(config: Config) -> Result<()> {
    init_logger(&config, Role::Controller)?;

    let db_path = config.database_path()?;
    let conn = ensure_schema(&db_path)?;
    let seeded = seed_demo_songs(&conn).context("failed to seed demo songs")?;
    if seeded > 0 {
        info!("seeded {seeded} demo songs into {}", db_path.display());
    }

    let screens = ScreenList::new(HostScreens::new(config.screen.clone()));
    let host = ProcessHost::from_config(&config)?;
    let projection = ProjectionController::new(Box::new(host), config.poll_interval());

    let mut app = App::new(conn, projection, screens.screens().to_vec(), config.notes_dir.clone())?;
    run_app(&mut app)
}
