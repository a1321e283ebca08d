//! Control-plane entry point.
//!
//! Serves the HTTP API; `migrate` subcommands manage the schema without
//! starting the server.

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use tranche::{config::ConfigLoader, db, server, shutdown, telemetry};

#[derive(Parser)]
#[command(name = "tranche")]
#[command(about = "Tranche control plane")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config, "control-plane")?;

    if let Some(Commands::Migrate { action }) = cli.command {
        let db = db::init_pool(&config).await?;
        handle_migrate_command(&db, action).await?;
        return Ok(());
    }

    let db = db::open(&config).await?;
    let shutdown = shutdown::shutdown_token();
    server::run_server(config, db, shutdown).await
}

async fn handle_migrate_command(
    db: &DatabaseConnection,
    action: MigrateAction,
) -> anyhow::Result<()> {
    match action {
        MigrateAction::Up => {
            db::run_migrations(db).await?;
            println!("All migrations applied successfully");
        }
        MigrateAction::Down => {
            Migrator::down(db, Some(1)).await?;
            println!("Migration rolled back successfully");
        }
        MigrateAction::Status => {
            let applied = Migrator::get_applied_migrations(db).await?;
            let pending = Migrator::get_pending_migrations(db).await?;
            println!("Applied migrations: {}", applied.len());
            println!("Pending migrations: {}", pending.len());
        }
    }
    Ok(())
}
