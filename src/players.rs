//! Player loader for the federation Elo ranking exports.
//!
//! The exports are `;`-separated, Latin-1 encoded, with at least the columns
//! `NACHNAME`, `VORNAME` and `ELO_KLASSIERUNG`.

use anyhow::{bail, Context, Result};
use clicktt_scraper::Player;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const MIN_CLASSIFICATION: f64 = 11.0;
pub const MAX_CLASSIFICATION: f64 = 21.0;

const SEPARATOR: u8 = b';';
const REQUIRED_COLUMNS: [&str; 3] = ["NACHNAME", "VORNAME", "ELO_KLASSIERUNG"];

/// Cell values the ranking exports use for "no value"; such rows are never in band
const MISSING_VALUES: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND",
    "1.#QNAN", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

// Short rows are padded: missing trailing cells deserialize as empty
#[derive(Debug, Deserialize)]
struct RankingRow {
    #[serde(rename = "NACHNAME", default)]
    last_name: String,
    #[serde(rename = "VORNAME", default)]
    first_name: String,
    #[serde(rename = "ELO_KLASSIERUNG", default)]
    classification: String,
}

/// Filtered candidates plus how many rows the exports held
#[derive(Debug, Default)]
pub struct Roster {
    pub players:   Vec<Player>,
    pub rows_read: usize,
}

/// Female export first, then male; order within each file is kept.
pub fn load_players(female_csv: &Path, male_csv: &Path) -> Result<Roster> {
    let mut roster = Roster::default();
    for path in [female_csv, male_csv] {
        let (players, rows_read) = read_ranking_file(path)?;
        roster.players.extend(players);
        roster.rows_read += rows_read;
    }
    Ok(roster)
}

fn read_ranking_file(path: &Path) -> Result<(Vec<Player>, usize)> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read ranking file {}", path.display()))?;
    parse_ranking_table(&decode_latin1(&bytes))
        .with_context(|| format!("Failed to parse ranking file {}", path.display()))
}

/// Returns the players inside the classification band and the number of data rows seen.
pub fn parse_ranking_table(text: &str) -> Result<(Vec<Player>, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(SEPARATOR)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().context("Failed to read header line")?;
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            bail!("missing column {column}");
        }
    }

    let mut players = Vec::new();
    let mut rows_read = 0;

    for (idx, row) in reader.deserialize::<RankingRow>().enumerate() {
        // +2: header line, 1-based
        let row = row.with_context(|| format!("line {}", idx + 2))?;
        rows_read += 1;

        let classification = parse_classification(&row.classification)
            .with_context(|| format!("line {}", idx + 2))?;

        if let Some(value) = classification.filter(|v| in_band(*v)) {
            players.push(Player {
                last_name:      row.last_name,
                first_name:     row.first_name,
                classification: value,
            });
        }
    }

    Ok((players, rows_read))
}

pub fn in_band(classification: f64) -> bool {
    (MIN_CLASSIFICATION..=MAX_CLASSIFICATION).contains(&classification)
}

/// Empty or missing-value cell means "not classified"
fn parse_classification(raw: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if MISSING_VALUES.contains(&raw) {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .with_context(|| format!("ELO_KLASSIERUNG {raw:?} is not a number"))
}

/// ISO-8859-1 maps every byte to the code point of the same value
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}
