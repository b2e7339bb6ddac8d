use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{self, AppState};
use crate::apps;
use crate::auth::PgSessionStore;
use crate::config::{AppConfig, StorageBackend};
use crate::database::{ddl, DatabaseManager, DatabaseTarget, PgStorage};

#[derive(Parser)]
#[command(name = "passfoo-api")]
#[command(about = "Passfoo API - questions-based password manager backend")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Use the test database (DB_TEST)")]
    pub test: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server")]
    Serve,

    #[command(about = "Create every table, including the session table")]
    CreateTables,

    #[command(about = "Drop every table")]
    DropTables {
        #[arg(long, help = "Confirm dropping all data")]
        yes: bool,
    },

    #[command(about = "Drop and recreate every table")]
    ResetDb {
        #[arg(long, help = "Confirm dropping all data")]
        yes: bool,
    },

    #[command(about = "Insert the stock security questions")]
    LoadFixtures,
}

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    apps::validate_entities().context("invalid entity declaration")?;
    let target = DatabaseTarget::from_test_flag(cli.test);

    match cli.command {
        Commands::Serve => serve(config, target).await,
        Commands::CreateTables => {
            let pool = connect(&config, target).await?;
            DatabaseManager::execute_all(&pool, &create_statements(&config)).await?;
            info!("Created {} tables", apps::entities().len() + 1);
            Ok(())
        }
        Commands::DropTables { yes } => {
            confirm(yes)?;
            let pool = connect(&config, target).await?;
            DatabaseManager::execute_all(&pool, &drop_statements(&config)).await?;
            info!("Dropped all tables");
            Ok(())
        }
        Commands::ResetDb { yes } => {
            confirm(yes)?;
            let pool = connect(&config, target).await?;
            let mut statements = drop_statements(&config);
            statements.extend(create_statements(&config));
            DatabaseManager::execute_all(&pool, &statements).await?;
            info!("Database reset");
            Ok(())
        }
        Commands::LoadFixtures => {
            let storage = PgStorage::new(connect(&config, target).await?);
            let count = apps::password::load_fixtures(&storage)
                .await
                .context("failed to load fixtures")?;
            println!("Loaded {} questions", count);
            Ok(())
        }
    }
}

async fn serve(config: AppConfig, target: DatabaseTarget) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr();
    info!("Starting passfoo-api in {:?} mode", config.environment);

    let state = AppState::connect(config, target).await?;
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    api::serve(listener, state).await
}

async fn connect(config: &AppConfig, target: DatabaseTarget) -> anyhow::Result<PgPool> {
    if config.database.backend == StorageBackend::Memory && target == DatabaseTarget::Default {
        bail!("STORAGE_BACKEND=memory has no tables to manage");
    }
    DatabaseManager::connect(config, target)
        .await
        .context("failed to connect to the database")
}

fn confirm(yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!("refusing to drop data without --yes");
    }
    Ok(())
}

fn create_statements(config: &AppConfig) -> Vec<String> {
    let mut statements = ddl::create_all(&apps::entities());
    statements.push(PgSessionStore::create_table_sql(&config.session.table));
    statements
}

fn drop_statements(config: &AppConfig) -> Vec<String> {
    let mut statements = vec![PgSessionStore::drop_table_sql(&config.session.table)];
    statements.extend(ddl::drop_all(&apps::entities()));
    statements
}
