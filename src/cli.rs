//! # CLI Execution Functions
//!
//! Kept out of `main.rs` so the entry point only parses arguments. Each
//! `run_*` function owns one subcommand.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use plantkeeper::api::{self, AppState};
use plantkeeper::config::{AppConfig, Secrets};
use plantkeeper::db::Database;
use plantkeeper::dto::parse_date;
use std::net::IpAddr;
use tracing::info;

use super::{Cli, KpiAction};

async fn connect(cli: &Cli) -> Result<Database> {
    let database_url = cli.database_url.as_deref().ok_or_else(|| {
        anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)")
    })?;
    Database::connect(database_url).await
}

fn date_arg(name: &str, raw: &str) -> Result<NaiveDate> {
    parse_date(raw).with_context(|| format!("--{} must be a date in YYYY-MM-DD format", name))
}

pub async fn run_serve(cli: &Cli, config: AppConfig, bind: IpAddr, port: u16) -> Result<()> {
    let secrets = Secrets::from_env();
    let db = connect(cli).await?;
    let state = AppState::from_config(db, config, &secrets)?;
    info!(debug = state.config.server.debug, hostname = %state.hostname, "plantkeeper starting");
    api::run(state, bind, port).await
}

pub async fn run_migrate(cli: &Cli) -> Result<()> {
    let db = connect(cli).await?;
    db.migrate().await?;
    info!("migrations applied");
    Ok(())
}

pub async fn run_kpi(cli: &Cli, config: &AppConfig, action: &KpiAction) -> Result<()> {
    let (start, end) = match action {
        KpiAction::Daily { date } => {
            let date = match date {
                Some(raw) => date_arg("date", raw)?,
                None => Utc::now().date_naive(),
            };
            (date, date)
        }
        KpiAction::Historical { start, end } => {
            let (start, end) = (date_arg("start", start)?, date_arg("end", end)?);
            if start > end {
                anyhow::bail!("--start must not be after --end");
            }
            (start, end)
        }
    };

    let db = connect(cli).await?;
    let mut days = 0u32;
    for date in start.iter_days().take_while(|d| *d <= end) {
        let row = db.recompute_kpi(date, &config.kpi).await?;
        info!(
            %date,
            active_users = row.active_users,
            total_impressions = row.total_impressions,
            impressions_per_user = row.impressions_per_user,
            target_achieved = row.target_achieved,
            "kpi recomputed"
        );
        days += 1;
    }
    println!("Recomputed KPIs for {} day(s), {} to {}", days, start, end);
    Ok(())
}
