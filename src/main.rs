use anyhow::Result;
use clap::{Parser, Subcommand};

use pgvault::cli::{handle_backup_command, handle_version_command};
use pgvault::config::{Settings, TargetEnvironment, VaultPaths};
use pgvault::exec::{DockerExecutor, KubernetesExecutor, TargetExecutor};
use pgvault::notify::FileStatusSink;
use pgvault::orchestrator::Orchestrator;
use pgvault::storage::InvocationLock;

#[derive(Parser)]
#[command(
    name = "pgvault",
    version,
    about = "PostgreSQL backup/restore orchestrator for Docker and Kubernetes",
    long_about = "pgvault runs pg_dump/psql inside a Docker container or Kubernetes pod, \
                  chooses between full and incremental dumps automatically, keeps a \
                  semantically versioned backup catalog, and prunes old backups \
                  according to retention policy."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup management commands
    #[command(subcommand)]
    Backup(pgvault::cli::BackupCommands),

    /// Version catalog commands
    #[command(subcommand, alias = "ver")]
    Version(pgvault::cli::VersionCommands),

    /// Initialize the backup directory and write default settings
    Init,

    /// Show current configuration and paths
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = VaultPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    match cli.command {
        Some(Commands::Backup(cmd)) => {
            paths.ensure_directories()?;
            let _lock = InvocationLock::acquire(paths.lock_file())?;
            let orchestrator = build_orchestrator(&paths, &settings)?;
            handle_backup_command(&paths, &orchestrator, cmd)?;
        }
        Some(Commands::Version(cmd)) => {
            paths.ensure_directories()?;
            let _lock = InvocationLock::acquire(paths.lock_file())?;
            let orchestrator = build_orchestrator(&paths, &settings)?;
            handle_version_command(&orchestrator, settings.version_keep_count, cmd)?;
        }
        Some(Commands::Init) => {
            println!(
                "Initializing pgvault at: {}",
                paths.backup_dir().display()
            );
            paths.ensure_directories()?;
            settings.save(&paths)?;
            println!("Initialization complete!");
            println!();
            println!("Edit {} to set your target:", paths.settings_file().display());
            println!("  - environment: docker or kubernetes");
            println!("  - target: container or pod name");
            println!("  - database: connection parameters");
        }
        Some(Commands::Config) => {
            println!("pgvault Configuration");
            println!("=====================");
            println!("Backup directory: {}", paths.backup_dir().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!();
            println!("Settings:");
            println!("  Environment: {}", settings.environment.as_str());
            println!(
                "  Target:      {}",
                settings.target.as_deref().unwrap_or("(not set)")
            );
            if settings.environment == TargetEnvironment::Kubernetes {
                println!("  Namespace:   {}", settings.namespace);
            }
            println!("  Database:    {}", settings.database.database);
            println!("  User:        {}", settings.database.user);
            println!("  Timeout:     {}s", settings.command_timeout_secs);
            println!(
                "  Retention:   daily {}, weekly {}, monthly {}, full {}",
                settings.retention.daily,
                settings.retention.weekly,
                settings.retention.monthly,
                settings.retention.full
            );
        }
        None => {
            println!("pgvault - PostgreSQL backup/restore orchestrator");
            println!();
            println!("Run 'pgvault --help' for usage information.");
            println!("Run 'pgvault init' to set up the backup directory.");
        }
    }

    Ok(())
}

fn build_orchestrator(paths: &VaultPaths, settings: &Settings) -> Result<Orchestrator> {
    let executor: Box<dyn TargetExecutor> = match settings.environment {
        TargetEnvironment::Docker => Box::new(DockerExecutor::new(settings.command_timeout_secs)),
        TargetEnvironment::Kubernetes => Box::new(KubernetesExecutor::new(
            settings.namespace.clone(),
            None,
            settings.command_timeout_secs,
        )),
    };
    let sink = Box::new(FileStatusSink::new(paths.clone()));

    Ok(Orchestrator::new(
        paths.clone(),
        settings.clone(),
        executor,
        sink,
    )?)
}
