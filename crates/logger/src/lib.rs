//! click-tt harvest: Logger
//! JSONL event stream, jeden soubor na UTC den

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open event log {}", path.display()))?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    /// Best effort: rozbitý event log nikdy nezastaví běh
    pub fn log_quiet<T: Serialize>(&self, event: &T) {
        if let Err(e) = self.log(event) {
            tracing::debug!("Event log write failed: {:#}", e);
        }
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event typy ────────────────────────────────────────────────────────────────

/// Jedna dokončená fáze běhu (načtení hráčů, ranking id, zápasy)
#[derive(Serialize, Debug)]
pub struct StageCompletedEvent {
    pub ts:           String,
    pub event:        &'static str,   // "STAGE_COMPLETED"
    pub stage:        String,         // "load_players" | "resolve_ids" | "harvest_matches"
    pub items_in:     usize,
    pub items_out:    usize,
    pub skipped:      usize,
    pub elapsed_ms:   u128,
}

impl StageCompletedEvent {
    pub fn new(stage: &str, items_in: usize, items_out: usize, skipped: usize, elapsed_ms: u128) -> Self {
        Self {
            ts: now_iso(),
            event: "STAGE_COMPLETED",
            stage: stage.to_string(),
            items_in,
            items_out,
            skipped,
            elapsed_ms,
        }
    }
}

/// Souhrn celého běhu, statistiky jsou null když nic nezapsáno
#[derive(Serialize, Debug)]
pub struct RunSummaryEvent {
    pub ts:                String,
    pub event:             &'static str,   // "RUN_SUMMARY"
    pub output_path:       String,
    pub total_matches:     usize,
    pub unique_matches:    usize,
    pub player_elo_min:    Option<f64>,    // None když prázdný výstup
    pub player_elo_max:    Option<f64>,
    pub opponent_elo_min:  Option<f64>,
    pub opponent_elo_max:  Option<f64>,
    pub win_rate_pct:      Option<f64>,
}
