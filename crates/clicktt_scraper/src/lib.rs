//! click-tt.ch Elo scraper pro historii zápasů Swiss Table Tennis
//!
//! Dva typy stránek stejného `eloFilter` endpointu:
//!   1. hledání podle jména -> první `<a href="...ranking=<id>...">` je ranking id hráče
//!   2. výpis podle id      -> tabulky odehraných zápasů
//!
//! Struktura řádku výpisu (jen buňky, které čteme):
//! <td>18.12.2025</td> <td>..</td> <td>1500,0</td> <td>..</td> <td>1480,5</td> <td>0,62</td> <td>3,20</td>
//!  date               player elo                opponent elo   expected     elo delta

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

pub const SEARCH_URL: &str = "https://www.click-tt.ch/cgi-bin/WebObjects/nuLigaTTCH.woa/wa/eloFilter";
pub const DEFAULT_FEDERATION: &str = "STT";
pub const DEFAULT_RANKING_DATE: &str = "18.12.2025";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Kratší řádky jsou hlavičky, oddělovače nebo součty
const MIN_MATCH_CELLS: usize = 7;
const RESOLVE_PROGRESS_EVERY: usize = 100;
const HARVEST_PROGRESS_EVERY: usize = 50;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").expect("static selector"));
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").expect("static selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("static selector"));
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("static selector"));

static RANKING_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ranking=(\d+)").expect("static regex"));
static DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}\.\d{2}\.\d{4}").expect("static regex"));

// ── Domain types ─────────────────────────────────────────────────────────────

/// Kandidát z Elo exportu federace
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub last_name:      String,
    pub first_name:     String,
    pub classification: f64,
}

/// One parsed match from a listing page.
///
/// Field order is the column order of the exported table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchRecord {
    pub player_elo:    f64,
    pub opponent_elo:  f64,
    pub win:           u8,   // 1 when elo_delta > 0
    pub expected_prob: f64,
    pub elo_delta:     f64,
}

impl MatchRecord {
    pub const HEADER: [&'static str; 5] =
        ["player_elo", "opponent_elo", "win", "expected_prob", "elo_delta"];

    pub fn new(player_elo: f64, opponent_elo: f64, expected_prob: f64, elo_delta: f64) -> Self {
        Self {
            player_elo,
            opponent_elo,
            win: u8::from(elo_delta > 0.0),
            expected_prob,
            elo_delta,
        }
    }

    pub fn is_win(&self) -> bool {
        self.win == 1
    }
}

/// Why a listing row did not become a [`MatchRecord`]
#[derive(Debug, Clone, PartialEq)]
pub enum RowSkip {
    TooFewCells(usize),
    NoDate(String),
    BadNumber { column: usize, text: String },
}

impl fmt::Display for RowSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSkip::TooFewCells(n) => write!(f, "row has {n} cells, need {MIN_MATCH_CELLS}"),
            RowSkip::NoDate(text) => write!(f, "first cell {text:?} is not a date"),
            RowSkip::BadNumber { column, text } => write!(f, "cell {column} {text:?} is not a number"),
        }
    }
}

/// Výsledek jednoho hledání podle jména
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(String),
    NoMatch,
    Failed(String),
}

/// Výsledek stažení jednoho výpisu
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    Rows(Vec<Result<MatchRecord, RowSkip>>),
    Failed(String),
}

/// Výstup fáze ranking id
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub ids:      BTreeSet<String>,
    pub players:  usize,
    pub found:    usize,
    pub no_match: usize,
    pub failed:   usize,
}

/// Výstup fáze stahování zápasů
#[derive(Debug, Clone, Default)]
pub struct Harvest {
    pub records:      Vec<MatchRecord>,
    pub pages:        usize,
    pub failed_pages: usize,
    pub rows_skipped: usize,
}

// ── Endpoints ────────────────────────────────────────────────────────────────

/// Parametry dotazu pevné pro celý běh
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub search_url:   String,
    pub federation:   String,
    pub ranking_date: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_FEDERATION, DEFAULT_RANKING_DATE)
    }
}

impl Endpoints {
    pub fn new(federation: impl Into<String>, ranking_date: impl Into<String>) -> Self {
        Self {
            search_url:   SEARCH_URL.to_string(),
            federation:   federation.into(),
            ranking_date: ranking_date.into(),
        }
    }

    pub fn search_query<'a>(&'a self, player: &'a Player) -> [(&'static str, &'a str); 4] {
        [
            ("federation", self.federation.as_str()),
            ("rankingDate", self.ranking_date.as_str()),
            ("lastname", player.last_name.as_str()),
            ("firstname", player.first_name.as_str()),
        ]
    }

    /// URL výpisu, ranking id se jen připojí na konec
    pub fn listing_url(&self, ranking_id: &str) -> String {
        format!(
            "{}?federation={}&rankingDate={}&ranking={}",
            self.search_url, self.federation, self.ranking_date, ranking_id
        )
    }
}

// ── Page source ──────────────────────────────────────────────────────────────

/// Cokoliv, co z GET requestu udělá HTML
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch(&self, url: &str, query: &[(&str, &str)]) -> Result<String>;
}

pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Self::client_builder(timeout)
            .build()
            .context("Failed to build click-tt HTTP client")?;
        Ok(Self { client })
    }

    /// `timeout` hlídá connect a každé čtení zvlášť, ne celé stažení
    fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .gzip(true)
    }
}

impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        let mut req = self.client.get(url);
        if !query.is_empty() {
            req = req.query(query);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("click-tt request failed for {url}"))?;

        // Chybové stránky parsujeme jako každou jinou, jen z nich nic nevypadne
        let status = resp.status();
        if !status.is_success() {
            debug!("click-tt HTTP {} for {}", status, url);
        }

        resp.text().await.context("Failed to read click-tt response body")
    }
}

// ── Scraper ──────────────────────────────────────────────────────────────────

/// Sekvenční dvoufázový scraper, po každém requestu pevná pauza
pub struct ClickTtScraper<S> {
    source:        S,
    endpoints:     Endpoints,
    request_delay: Duration,
}

impl<S: PageSource> ClickTtScraper<S> {
    pub fn new(source: S, endpoints: Endpoints, request_delay: Duration) -> Self {
        Self { source, endpoints, request_delay }
    }

    /// Najde hráče podle jména a vezme první ranking odkaz
    pub async fn lookup_player(&self, player: &Player) -> Lookup {
        let query = self.endpoints.search_query(player);
        match self.source.fetch(&self.endpoints.search_url, &query).await {
            Ok(html) => match parse_ranking_id(&html) {
                Some(id) => Lookup::Found(id),
                None => Lookup::NoMatch,
            },
            Err(e) => Lookup::Failed(format!("{e:#}")),
        }
    }

    /// Look up every player in order; ids from different players may collide
    /// and are merged by the set.
    pub async fn resolve_ranking_ids(&self, players: &[Player]) -> Resolution {
        let total = players.len();
        let mut resolution = Resolution { players: total, ..Default::default() };

        for (i, player) in players.iter().enumerate() {
            if (i + 1) % RESOLVE_PROGRESS_EVERY == 0 {
                info!("  {}/{}...", i + 1, total);
            }

            match self.lookup_player(player).await {
                Lookup::Found(id) => {
                    resolution.found += 1;
                    resolution.ids.insert(id);
                }
                Lookup::NoMatch => {
                    resolution.no_match += 1;
                    debug!("No ranking link for {} {}", player.first_name, player.last_name);
                }
                Lookup::Failed(reason) => {
                    resolution.failed += 1;
                    debug!("Lookup failed for {} {}: {}", player.first_name, player.last_name, reason);
                }
            }

            self.pause().await;
        }

        resolution
    }

    /// Stáhne a naparsuje jeden výpis
    pub async fn fetch_listing(&self, ranking_id: &str) -> Listing {
        let url = self.endpoints.listing_url(ranking_id);
        match self.source.fetch(&url, &[]).await {
            Ok(html) => Listing::Rows(parse_match_rows(&html)),
            Err(e) => Listing::Failed(format!("{e:#}")),
        }
    }

    pub async fn harvest_matches(&self, ranking_ids: &BTreeSet<String>) -> Harvest {
        let total = ranking_ids.len();
        let mut harvest = Harvest::default();

        for (i, ranking_id) in ranking_ids.iter().enumerate() {
            if (i + 1) % HARVEST_PROGRESS_EVERY == 0 {
                info!("  {}/{} players... ({} matches)", i + 1, total, harvest.records.len());
            }

            match self.fetch_listing(ranking_id).await {
                Listing::Rows(rows) => {
                    harvest.pages += 1;
                    for row in rows {
                        match row {
                            Ok(record) => harvest.records.push(record),
                            Err(skip) => {
                                harvest.rows_skipped += 1;
                                debug!("ranking {}: skipped row, {}", ranking_id, skip);
                            }
                        }
                    }
                }
                Listing::Failed(reason) => {
                    harvest.failed_pages += 1;
                    debug!("ranking {}: listing failed, {}", ranking_id, reason);
                }
            }

            self.pause().await;
        }

        harvest
    }

    async fn pause(&self) {
        if !self.request_delay.is_zero() {
            sleep(self.request_delay).await;
        }
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// First `ranking=<digits>` found in anchor hrefs, in document order
pub fn parse_ranking_id(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let mut hrefs = document.select(&ANCHOR).filter_map(|a| a.value().attr("href"));
    hrefs.find_map(|href| RANKING_HREF.captures(href).map(|c| c[1].to_string()))
}

/// Every `<tr>` of every `<table>`, parsed or with the reason it was skipped
pub fn parse_match_rows(html: &str) -> Vec<Result<MatchRecord, RowSkip>> {
    let document = Html::parse_document(html);
    let mut rows = Vec::new();

    for table in document.select(&TABLE) {
        for row in table.select(&ROW) {
            let cells: Vec<String> = row.select(&CELL).map(cell_text).collect();
            rows.push(parse_match_row(&cells));
        }
    }

    rows
}

pub fn parse_match_row<S: AsRef<str>>(cells: &[S]) -> Result<MatchRecord, RowSkip> {
    if cells.len() < MIN_MATCH_CELLS {
        return Err(RowSkip::TooFewCells(cells.len()));
    }

    let date = cells[0].as_ref();
    if !DATE_PREFIX.is_match(date) {
        return Err(RowSkip::NoDate(date.to_string()));
    }

    let number = |column: usize| {
        let text = cells[column].as_ref();
        parse_decimal(text).ok_or_else(|| RowSkip::BadNumber { column, text: text.to_string() })
    };

    Ok(MatchRecord::new(number(2)?, number(4)?, number(5)?, number(6)?))
}

/// Swiss-formatted decimal: `1480,5` -> 1480.5
pub fn parse_decimal(text: &str) -> Option<f64> {
    text.trim().replace(',', ".").parse().ok()
}

/// Textové uzly oříznuté jednotlivě a slepené dohromady
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().map(str::trim).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const LISTING_ROW: [&str; 7] = ["18.12.2025", "", "1500,0", "", "1480,5", "0,62", "3,20"];

    fn player(last: &str, first: &str) -> Player {
        Player { last_name: last.into(), first_name: first.into(), classification: 15.0 }
    }

    fn listing_page(rows: &[[&str; 7]]) -> String {
        let body: String = rows
            .iter()
            .map(|cells| {
                let tds: String = cells.iter().map(|c| format!("<td>{c}</td>")).collect();
                format!("<tr>{tds}</tr>")
            })
            .collect();
        format!("<html><body><table><tr><th>Datum</th></tr>{body}</table></body></html>")
    }

    /// Serves pages by `lastname` query value, or by full URL for listings
    struct CannedPages {
        pages: HashMap<String, String>,
    }

    impl PageSource for CannedPages {
        async fn fetch(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
            let key = query
                .iter()
                .find(|(k, _)| *k == "lastname")
                .map(|(_, v)| v.to_string())
                .unwrap_or_else(|| url.to_string());
            self.pages
                .get(&key)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("connection refused for {key}"))
        }
    }

    fn scraper(pages: Vec<(String, String)>) -> ClickTtScraper<CannedPages> {
        let source = CannedPages { pages: pages.into_iter().collect() };
        ClickTtScraper::new(source, Endpoints::default(), Duration::ZERO)
    }

    #[test]
    fn ranking_id_is_first_matching_anchor() {
        let html = r#"
            <a href="/wa/clubInfo?club=7">club</a>
            <a>no href</a>
            <a href="eloFilter?federation=STT&amp;ranking=4711&amp;x=1">Muster Anna</a>
            <a href="eloFilter?ranking=9999">Muster Berta</a>"#;
        assert_eq!(parse_ranking_id(html), Some("4711".to_string()));
    }

    #[test]
    fn ranking_id_needs_digits() {
        let html = r#"<a href="eloFilter?ranking=">empty</a><a href="x?ranking=abc">abc</a>"#;
        assert_eq!(parse_ranking_id(html), None);
        assert_eq!(parse_ranking_id("<p>Keine Spieler gefunden</p>"), None);
    }

    #[test]
    fn date_prefix_with_trailing_text_is_accepted() {
        let cells = ["01.02.2024 (extra text)", "x", "1600", "y", "1550", "0,57", "4,1"];
        let record = parse_match_row(&cells).unwrap();
        assert_eq!(record.player_elo, 1600.0);
        assert_eq!(record.opponent_elo, 1550.0);
        assert_eq!(record.expected_prob, 0.57);
        assert_eq!(record.elo_delta, 4.1);
        assert!(record.is_win());
    }

    #[test]
    fn comma_decimals_and_win_flag() {
        let loss = ["01.02.2024", "", "1500", "", "1480", "0,5", "-3,50"];
        let record = parse_match_row(&loss).unwrap();
        assert_eq!(record.elo_delta, -3.5);
        assert_eq!(record.win, 0);

        let win = ["01.02.2024", "", "1500", "", "1480", "0,5", "2,00"];
        assert_eq!(parse_match_row(&win).unwrap().win, 1);

        let zero = ["01.02.2024", "", "1500", "", "1480", "0,5", "0,00"];
        assert_eq!(parse_match_row(&zero).unwrap().win, 0);
    }

    #[test]
    fn malformed_rows_are_skipped_with_reason() {
        assert_eq!(parse_match_row(&["18.12.2025", "a", "b"]), Err(RowSkip::TooFewCells(3)));

        let no_date = ["Total", "", "1500", "", "1480", "0,5", "1,0"];
        assert_eq!(parse_match_row(&no_date), Err(RowSkip::NoDate("Total".into())));

        let short_date = ["1.2.2024", "", "1500", "", "1480", "0,5", "1,0"];
        assert!(matches!(parse_match_row(&short_date), Err(RowSkip::NoDate(_))));

        let bad = ["18.12.2025", "", "1500", "", "n/a", "0,5", "1,0"];
        assert_eq!(
            parse_match_row(&bad),
            Err(RowSkip::BadNumber { column: 4, text: "n/a".into() })
        );
    }

    #[test]
    fn listing_page_yields_records_and_skips() {
        let html = listing_page(&[LISTING_ROW]);
        let rows = parse_match_rows(&html);
        // header row (th only) + one match row
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], Err(RowSkip::TooFewCells(0)));
        assert_eq!(rows[1], Ok(MatchRecord::new(1500.0, 1480.5, 0.62, 3.2)));
    }

    #[test]
    fn cell_text_is_trimmed_per_text_node() {
        let html = "<table><tr><td> 18.12.2025 <br> Meisterschaft </td><td></td><td> 1500,0 </td>\
                    <td></td><td><b> 1480,5</b></td><td>0,62 </td><td>\n3,20\n</td></tr></table>";
        let rows = parse_match_rows(html);
        assert_eq!(rows, vec![Ok(MatchRecord::new(1500.0, 1480.5, 0.62, 3.2))]);
    }

    #[test]
    fn page_without_tables_yields_nothing() {
        assert!(parse_match_rows("<html><body><p>Keine Daten</p></body></html>").is_empty());
        assert!(parse_match_rows("").is_empty());
    }

    #[test]
    fn listing_url_appends_ranking_id() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints.listing_url("101"),
            "https://www.click-tt.ch/cgi-bin/WebObjects/nuLigaTTCH.woa/wa/eloFilter?federation=STT&rankingDate=18.12.2025&ranking=101"
        );
    }

    #[tokio::test]
    async fn resolve_merges_collisions_and_skips_failures() {
        let scraper = scraper(vec![
            ("Muster".into(), r#"<a href="eloFilter?ranking=101">Muster</a>"#.into()),
            ("Beispiel".into(), r#"<a href="eloFilter?ranking=101">Beispiel</a>"#.into()),
            ("Leer".into(), "<p>Keine Spieler</p>".into()),
        ]);
        let players = vec![
            player("Muster", "Anna"),
            player("Beispiel", "Berta"),
            player("Leer", "Carla"),
            player("Offline", "Dora"),
        ];

        let resolution = scraper.resolve_ranking_ids(&players).await;

        assert_eq!(resolution.ids, BTreeSet::from(["101".to_string()]));
        assert_eq!(resolution.players, 4);
        assert_eq!(resolution.found, 2);
        assert_eq!(resolution.no_match, 1);
        assert_eq!(resolution.failed, 1);
    }

    #[tokio::test]
    async fn harvest_collects_rows_across_listings() {
        let endpoints = Endpoints::default();
        let scraper = scraper(vec![
            (endpoints.listing_url("101"), listing_page(&[LISTING_ROW])),
            (endpoints.listing_url("202"), "<html><body>Wartung</body></html>".into()),
        ]);
        let ids: BTreeSet<String> = ["101", "202", "303"].into_iter().map(String::from).collect();

        let harvest = scraper.harvest_matches(&ids).await;

        assert_eq!(
            harvest.records,
            vec![MatchRecord {
                player_elo: 1500.0,
                opponent_elo: 1480.5,
                win: 1,
                expected_prob: 0.62,
                elo_delta: 3.2,
            }]
        );
        assert_eq!(harvest.pages, 2);
        assert_eq!(harvest.failed_pages, 1);
        assert_eq!(harvest.rows_skipped, 1);
    }

    #[tokio::test]
    async fn slow_body_within_read_timeout_is_fetched() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let chunks = [
            "<table><tr>",
            "<td>18.12.2025</td><td></td>",
            "<td>1500</td><td></td>",
            "<td>1480</td><td>0,5</td><td>1</td></tr></table>",
        ];
        let body_len: usize = chunks.iter().map(|c| c.len()).sum();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {body_len}\r\nConnection: close\r\n\r\n");
            socket.write_all(head.as_bytes()).await.unwrap();
            // celkem ~600 ms, každá mezera pod 300 ms timeoutem
            for chunk in chunks {
                sleep(Duration::from_millis(150)).await;
                socket.write_all(chunk.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
            }
        });

        let client = HttpPageSource::client_builder(Duration::from_millis(300))
            .no_proxy()
            .build()
            .unwrap();
        let source = HttpPageSource { client };
        let html = source.fetch(&format!("http://{addr}/eloFilter"), &[]).await.unwrap();
        server.await.unwrap();

        assert_eq!(parse_match_rows(&html), vec![Ok(MatchRecord::new(1500.0, 1480.0, 0.5, 1.0))]);
    }

    #[tokio::test]
    async fn failed_listing_is_reported_not_fatal() {
        let scraper = scraper(vec![]);
        match scraper.fetch_listing("404").await {
            Listing::Failed(reason) => assert!(reason.contains("connection refused")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
