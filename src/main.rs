//! click-tt harvest: Elo match history scraper
//!
//! Co dělá:
//!   1. Načte ženský + mužský Elo export, ponechá ELO_KLASSIERUNG 11–21
//!   2. Pro každého hráče hledá na click-tt.ch jeho ranking id
//!   3. Pro každé ranking id stáhne Elo historii a vytáhne řádky zápasů
//!   4. Odstraní duplicity a zapíše data/historical_matches.csv
//!
//! Co NEDĚLÁ: žádné paralelní requesty, žádné retry (pevná pauza 0.2s)
//!
//! Spuštění:
//!   cargo run --bin scrape-matches

mod config;
mod players;
mod writer;

use anyhow::Result;
use clicktt_scraper::{ClickTtScraper, HttpPageSource};
use config::HarvestConfig;
use dotenv::dotenv;
use logger::{now_iso, EventLogger, RunSummaryEvent, StageCompletedEvent};
use std::env;
use std::fs::File;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let config = HarvestConfig::from_env();

    // Single instance lock, both runs would write the same output file
    let lock_file_path = env::temp_dir().join("clicktt_harvest.lock");
    let lock_file = match File::create(&lock_file_path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create lock file at {:?}: {}", lock_file_path, e);
            return Ok(());
        }
    };

    let mut lock = fd_lock::RwLock::new(lock_file);
    let _write_guard = match lock.try_write() {
        Ok(guard) => guard,
        Err(_) => {
            warn!("Another instance of scrape-matches is already running! Exiting.");
            return Ok(());
        }
    };

    let events = EventLogger::new(&config.log_dir);

    // ── 1. Players ───────────────────────────────────────────────────────────
    info!("Loading player data...");
    let started = Instant::now();
    let roster = players::load_players(&config.female_csv, &config.male_csv)?;
    info!(
        "Found {} players with ELO_KLASSIERUNG {}-{}",
        roster.players.len(),
        players::MIN_CLASSIFICATION,
        players::MAX_CLASSIFICATION
    );
    events.log_quiet(&StageCompletedEvent::new(
        "load_players",
        roster.rows_read,
        roster.players.len(),
        roster.rows_read - roster.players.len(),
        started.elapsed().as_millis(),
    ));

    let source = HttpPageSource::new(config.timeout)?;
    let scraper = ClickTtScraper::new(source, config.endpoints(), config.request_delay);

    // ── 2. Ranking ids ───────────────────────────────────────────────────────
    info!("Collecting ranking IDs...");
    let started = Instant::now();
    let resolution = scraper.resolve_ranking_ids(&roster.players).await;
    info!("Found {} unique ranking IDs", resolution.ids.len());
    info!(
        "Lookups: {} with ranking link, {} without, {} failed",
        resolution.found, resolution.no_match, resolution.failed
    );
    events.log_quiet(&StageCompletedEvent::new(
        "resolve_ids",
        resolution.players,
        resolution.ids.len(),
        resolution.no_match + resolution.failed,
        started.elapsed().as_millis(),
    ));

    // ── 3. Matches ───────────────────────────────────────────────────────────
    info!("Scraping matches...");
    let started = Instant::now();
    let harvest = scraper.harvest_matches(&resolution.ids).await;
    info!(
        "Listings: {} fetched, {} failed, {} rows skipped",
        harvest.pages, harvest.failed_pages, harvest.rows_skipped
    );
    events.log_quiet(&StageCompletedEvent::new(
        "harvest_matches",
        resolution.ids.len(),
        harvest.records.len(),
        harvest.failed_pages,
        started.elapsed().as_millis(),
    ));

    // ── 4. Output ────────────────────────────────────────────────────────────
    let report = writer::write_matches(&config.output, harvest.records)?;
    events.log_quiet(&RunSummaryEvent {
        ts:               now_iso(),
        event:            "RUN_SUMMARY",
        output_path:      config.output.display().to_string(),
        total_matches:    report.total,
        unique_matches:   report.unique,
        player_elo_min:   report.stats.map(|s| s.player_elo_min),
        player_elo_max:   report.stats.map(|s| s.player_elo_max),
        opponent_elo_min: report.stats.map(|s| s.opponent_elo_min),
        opponent_elo_max: report.stats.map(|s| s.opponent_elo_max),
        win_rate_pct:     report.stats.map(|s| s.win_rate_pct),
    });

    Ok(())
}
