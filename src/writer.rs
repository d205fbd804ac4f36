//! Dedupe harvested matches and write them as a flat CSV table.

use anyhow::{Context, Result};
use clicktt_scraper::MatchRecord;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchStats {
    pub player_elo_min:   f64,
    pub player_elo_max:   f64,
    pub opponent_elo_min: f64,
    pub opponent_elo_max: f64,
    pub win_rate_pct:     f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteReport {
    pub total:  usize,
    pub unique: usize,
    pub stats:  Option<MatchStats>,
}

/// Whole-row equality on the bit patterns; `-0.0` folds into `0.0`
type RowKey = [u64; 5];

fn row_key(r: &MatchRecord) -> RowKey {
    fn bits(x: f64) -> u64 {
        if x == 0.0 { 0 } else { x.to_bits() }
    }
    [
        bits(r.player_elo),
        bits(r.opponent_elo),
        u64::from(r.win),
        bits(r.expected_prob),
        bits(r.elo_delta),
    ]
}

/// Drops exact duplicates, keeping the first occurrence in place
pub fn dedupe(records: Vec<MatchRecord>) -> Vec<MatchRecord> {
    let mut seen = HashSet::new();
    records.into_iter().filter(|r| seen.insert(row_key(r))).collect()
}

pub fn summarize(records: &[MatchRecord]) -> Option<MatchStats> {
    if records.is_empty() {
        return None;
    }

    let init = MatchStats {
        player_elo_min:   f64::INFINITY,
        player_elo_max:   f64::NEG_INFINITY,
        opponent_elo_min: f64::INFINITY,
        opponent_elo_max: f64::NEG_INFINITY,
        win_rate_pct:     0.0,
    };
    let mut stats = records.iter().fold(init, |s, r| MatchStats {
        player_elo_min:   s.player_elo_min.min(r.player_elo),
        player_elo_max:   s.player_elo_max.max(r.player_elo),
        opponent_elo_min: s.opponent_elo_min.min(r.opponent_elo),
        opponent_elo_max: s.opponent_elo_max.max(r.opponent_elo),
        win_rate_pct:     s.win_rate_pct,
    });

    let wins = records.iter().filter(|r| r.is_win()).count();
    stats.win_rate_pct = wins as f64 / records.len() as f64 * 100.0;
    Some(stats)
}

/// Header row is always written, so an empty harvest still yields a valid table
pub fn write_csv(path: &Path, records: &[MatchRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create output dir {}", parent.display()))?;
    }

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("open output {}", path.display()))?;

    wtr.write_record(MatchRecord::HEADER)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush().with_context(|| format!("flush output {}", path.display()))?;
    Ok(())
}

pub fn write_matches(path: &Path, records: Vec<MatchRecord>) -> Result<WriteReport> {
    let total = records.len();
    info!("Total matches: {}", total);

    let unique = dedupe(records);
    write_csv(path, &unique)?;
    info!("Saved {} unique matches to {}", unique.len(), path.display());

    let stats = summarize(&unique);
    if let Some(s) = &stats {
        info!("Summary:");
        info!("  Player Elo: {:.0} - {:.0}", s.player_elo_min, s.player_elo_max);
        info!("  Opponent Elo: {:.0} - {:.0}", s.opponent_elo_min, s.opponent_elo_max);
        info!("  Win rate: {:.1}%", s.win_rate_pct);
    }

    Ok(WriteReport { total, unique: unique.len(), stats })
}
