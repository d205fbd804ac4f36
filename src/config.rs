use clicktt_scraper::{Endpoints, DEFAULT_FEDERATION, DEFAULT_RANKING_DATE};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_FEMALE_CSV: &str = "data/elo-rankings_female_20251218.csv";
const DEFAULT_MALE_CSV: &str = "data/elo-rankings_male_20251218.csv";
const DEFAULT_OUTPUT: &str = "data/historical_matches.csv";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_REQUEST_DELAY_MS: u64 = 200;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Run settings; every field can be overridden from the environment (or `.env`)
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    pub female_csv:    PathBuf,
    pub male_csv:      PathBuf,
    pub output:        PathBuf,
    pub federation:    String,
    pub ranking_date:  String,
    pub request_delay: Duration,
    pub timeout:       Duration,
    pub log_dir:       PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            female_csv:    DEFAULT_FEMALE_CSV.into(),
            male_csv:      DEFAULT_MALE_CSV.into(),
            output:        DEFAULT_OUTPUT.into(),
            federation:    DEFAULT_FEDERATION.into(),
            ranking_date:  DEFAULT_RANKING_DATE.into(),
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            timeout:       Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_dir:       DEFAULT_LOG_DIR.into(),
        }
    }
}

impl HarvestConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: u64| {
            get(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        Self {
            female_csv:    get("CLICKTT_FEMALE_CSV").map(PathBuf::from).unwrap_or(defaults.female_csv),
            male_csv:      get("CLICKTT_MALE_CSV").map(PathBuf::from).unwrap_or(defaults.male_csv),
            output:        get("CLICKTT_OUTPUT").map(PathBuf::from).unwrap_or(defaults.output),
            federation:    get("CLICKTT_FEDERATION").unwrap_or(defaults.federation),
            ranking_date:  get("CLICKTT_RANKING_DATE").unwrap_or(defaults.ranking_date),
            request_delay: Duration::from_millis(number("CLICKTT_REQUEST_DELAY_MS", DEFAULT_REQUEST_DELAY_MS)),
            timeout:       Duration::from_secs(number("CLICKTT_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)),
            log_dir:       get("CLICKTT_LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(self.federation.clone(), self.ranking_date.clone())
    }
}
