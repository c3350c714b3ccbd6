//! Database maintenance commands.

use std::path::PathBuf;

use clap::Subcommand;

/// Sub-commands available under `db`.
#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Upsert the platform template library
    SeedTemplates {
        /// Template file (defaults to `CBRAIN_TEMPLATES_PATH`)
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

pub(crate) async fn run_db(
    pool: &sqlx::PgPool,
    config: &cbrain_core::AppConfig,
    command: DbCommands,
) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            cbrain_db::health_check(pool).await?;
            println!("database ok");
        }
        DbCommands::Migrate => {
            let applied = cbrain_db::run_migrations(pool).await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::SeedTemplates { file } => {
            let path = file.unwrap_or_else(|| config.templates_path.clone());
            let templates = cbrain_core::load_templates(&path)?;
            let count = cbrain_db::seed_templates(pool, &templates.templates).await?;
            println!("seeded {count} template(s) from {}", path.display());
        }
    }
    Ok(())
}
