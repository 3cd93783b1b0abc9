//! # AIX Admin
//!
//! Brings the membership store's schema up to date and reports what it holds.

use aix_admin::models::{CourseTitle, Member};
use aix_admin::{Config, Db};
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aix_admin=info")),
        )
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    let db = Db::connect(&config)
        .await
        .with_context(|| format!("Failed to connect to {}", config.database_url))?;
    db.migrate().await.context("Failed to apply migrations")?;

    let members = Member::count(&db).await.context("Failed to count members")?;
    let courses = CourseTitle::count(&db)
        .await
        .context("Failed to count course titles")?;
    tracing::info!("The store holds {members} member(s) and {courses} course title(s)");

    db.close().await;
    Ok(())
}
