use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::http_cache::app_cache_dir;
use crate::names::NameMap;
use crate::rank::WildcardCategory;

pub const RESULTS_BASE_URL: &str = "https://www.formula1.com/en/results";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellCoords {
    pub row: u32,
    pub col: u32,
}

impl CellCoords {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// A1-style reference, e.g. `B2`.
    pub fn a1(&self) -> String {
        let mut col = self.col;
        let mut letters = Vec::new();
        while col > 0 {
            let rem = ((col - 1) % 26) as u8;
            letters.push((b'A' + rem) as char);
            col = (col - 1) / 26;
        }
        letters.reverse();
        format!("{}{}", letters.into_iter().collect::<String>(), self.row)
    }
}

/// A rectangular region on the sheet: a header row followed by `length` data
/// rows across `width` columns starting at `first_col`. All 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCoords {
    pub header_row: u32,
    pub first_col: u32,
    pub width: u32,
    pub length: u32,
}

impl TableCoords {
    pub fn origin(&self) -> CellCoords {
        CellCoords::new(self.header_row, self.first_col)
    }

    pub fn data_cell(&self, row_offset: u32, col_offset: u32) -> CellCoords {
        CellCoords::new(
            self.header_row + 1 + row_offset,
            self.first_col + col_offset,
        )
    }
}

#[derive(Debug, Clone)]
pub struct WildcardTables {
    pub poles: TableCoords,
    pub fastest_laps: TableCoords,
    pub podiums: TableCoords,
    pub dnfs: TableCoords,
}

impl WildcardTables {
    pub fn for_category(&self, category: WildcardCategory) -> &TableCoords {
        match category {
            WildcardCategory::Poles => &self.poles,
            WildcardCategory::FastestLaps => &self.fastest_laps,
            WildcardCategory::Podiums => &self.podiums,
            WildcardCategory::Dnfs => &self.dnfs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetLayout {
    pub last_updated: CellCoords,
    pub cursor: CellCoords,
    pub next_race_name: CellCoords,
    pub next_race_date: CellCoords,
    /// Per player: prediction column followed by score column.
    pub scoreboard: TableCoords,
    /// Label column, then per player: pick column followed by score column.
    pub wildcard_points: TableCoords,
    pub player_totals: Vec<CellCoords>,
    /// One data row per raceweek, one column per player.
    pub points_tracker: TableCoords,
    pub driver_standings: TableCoords,
    pub team_standings: TableCoords,
    pub wildcards: WildcardTables,
}

impl SheetLayout {
    pub fn standard(game: &GameConfig) -> Self {
        let players = game.players.len() as u32;
        let drivers = game.names.driver_count() as u32;
        let teams = game.tot_teams as u32;

        let scoreboard = TableCoords {
            header_row: 13,
            first_col: 2,
            width: players * 2,
            length: (game.prediction_drivers + game.tot_teams) as u32,
        };
        let wildcard_points = TableCoords {
            header_row: scoreboard.header_row + scoreboard.length + 1,
            first_col: scoreboard.first_col - 1,
            width: players * 2 + 1,
            length: 5,
        };
        let totals_row = wildcard_points.header_row + wildcard_points.length + 1;
        let player_totals = (0..players)
            .map(|i| CellCoords::new(totals_row, scoreboard.first_col + i * 2 + 1))
            .collect();
        let standings_col = scoreboard.first_col + scoreboard.width + 2;
        let driver_standings = TableCoords {
            header_row: scoreboard.header_row,
            first_col: standings_col,
            width: 2,
            length: drivers,
        };
        let team_standings = TableCoords {
            header_row: driver_standings.header_row + drivers + 1,
            first_col: standings_col,
            width: 2,
            length: teams,
        };
        let wildcard_header = wildcard_points.header_row + 10;
        let wildcard_table = |first_col: u32| TableCoords {
            header_row: wildcard_header,
            first_col,
            width: 3,
            length: drivers,
        };

        Self {
            last_updated: CellCoords::new(1, 2),
            cursor: CellCoords::new(2, 2),
            next_race_name: CellCoords::new(3, 2),
            next_race_date: CellCoords::new(4, 2),
            scoreboard,
            wildcard_points,
            player_totals,
            points_tracker: TableCoords {
                header_row: 28,
                first_col: 16,
                width: players,
                length: game.tot_races as u32,
            },
            driver_standings,
            team_standings,
            wildcards: WildcardTables {
                poles: wildcard_table(1),
                fastest_laps: wildcard_table(5),
                podiums: wildcard_table(9),
                dnfs: wildcard_table(13),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub offset_hours: i64,
    pub update_window_hours: i64,
    pub update_interval: Duration,
    pub backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            offset_hours: 1,
            update_window_hours: 3,
            update_interval: Duration::from_secs(5 * 60),
            backoff: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub year: i32,
    pub players: Vec<String>,
    pub tot_teams: usize,
    pub prediction_drivers: usize,
    pub tot_races: usize,
    pub names: NameMap,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            year: 2025,
            players: ["Tim", "Freya", "Tom", "Shaun"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            tot_teams: 10,
            prediction_drivers: 20,
            tot_races: 24,
            names: NameMap::season_2025(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub game: GameConfig,
    pub layout: SheetLayout,
    pub schedule_path: PathBuf,
    pub sheet_db_path: PathBuf,
    pub tally_db_path: PathBuf,
    pub results_base_url: String,
    pub fetch_parallelism: usize,
}

impl AppConfig {
    pub fn new(scheduler: SchedulerConfig, game: GameConfig) -> Self {
        let layout = SheetLayout::standard(&game);
        let data_dir = app_cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            scheduler,
            game,
            layout,
            schedule_path: PathBuf::from("race_schedule.json"),
            sheet_db_path: data_dir.join("sheet.sqlite"),
            tally_db_path: data_dir.join("wildcard_tally.sqlite"),
            results_base_url: RESULTS_BASE_URL.to_string(),
            fetch_parallelism: 4,
        }
    }

    pub fn from_env() -> Result<Self> {
        let defaults = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            offset_hours: env_parse("F1P_OFFSET_HOURS", defaults.offset_hours),
            update_window_hours: env_parse("F1P_UPDATE_WINDOW_HOURS", defaults.update_window_hours)
                .max(1),
            update_interval: Duration::from_secs(
                env_parse("F1P_UPDATE_INTERVAL_SECS", defaults.update_interval.as_secs()).max(10),
            ),
            backoff: Duration::from_secs(
                env_parse("F1P_BACKOFF_SECS", defaults.backoff.as_secs()).max(60),
            ),
        };

        let mut game = GameConfig::default();
        game.year = env_parse("F1P_YEAR", game.year);
        if let Some(players) = env_list("F1P_PLAYERS") {
            game.players = players;
        }
        game.tot_teams = env_parse("F1P_TOT_TEAMS", game.tot_teams);
        game.prediction_drivers = env_parse("F1P_PREDICTION_DRIVERS", game.prediction_drivers);
        game.tot_races = env_parse("F1P_TOT_RACES", game.tot_races);
        if let Some(path) = env_path("F1P_NAMES_FILE") {
            game.names = NameMap::load(&path)?;
        }
        if game.players.is_empty() {
            return Err(anyhow!("F1P_PLAYERS resolved to an empty player list"));
        }
        if game.names.teams.len() != game.tot_teams {
            tracing::warn!(
                "name map lists {} teams but F1P_TOT_TEAMS is {}",
                game.names.teams.len(),
                game.tot_teams
            );
        }

        let mut config = Self::new(scheduler, game);
        if let Some(path) = env_path("F1P_SCHEDULE_FILE") {
            config.schedule_path = path;
        }
        if let Some(path) = env_path("F1P_SHEET_DB") {
            config.sheet_db_path = path;
        }
        if let Some(path) = env_path("F1P_TALLY_DB") {
            config.tally_db_path = path;
        }
        if let Ok(base) = std::env::var("F1P_RESULTS_BASE_URL")
            && !base.trim().is_empty()
        {
            config.results_base_url = base.trim().trim_end_matches('/').to_string();
        }
        config.fetch_parallelism = env_parse("F1P_FETCH_PARALLELISM", config.fetch_parallelism)
            .clamp(1, 16);
        Ok(config)
    }

    pub fn standings_url(&self, site: &str) -> String {
        format!("{}/{}/{site}", self.results_base_url, self.game.year)
    }

    pub fn describe(&self) -> String {
        format!(
            "season {} players [{}] schedule {} window +{}h/{}h poll {}s",
            self.game.year,
            self.game.players.join(", "),
            self.schedule_path.display(),
            self.scheduler.offset_hours,
            self.scheduler.update_window_hours,
            self.scheduler.update_interval.as_secs()
        )
    }
}

fn env_parse<T: std::str::FromStr + std::fmt::Display + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::error!("{key}={raw:?} is not valid; using {default}");
                default
            }
        },
        _ => default,
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    let items = raw
        .split([',', ';'])
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect::<Vec<_>>();
    Some(items)
}

fn env_path(key: &str) -> Option<PathBuf> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_layout_matches_season_sheet() {
        let game = GameConfig::default();
        let layout = SheetLayout::standard(&game);
        assert_eq!(layout.cursor.a1(), "B2");
        assert_eq!(layout.scoreboard.header_row, 13);
        assert_eq!(layout.scoreboard.width, 8);
        assert_eq!(layout.scoreboard.length, 30);
        assert_eq!(layout.wildcard_points.header_row, 44);
        assert_eq!(layout.wildcard_points.first_col, 1);
        assert_eq!(layout.player_totals[0], CellCoords::new(50, 3));
        assert_eq!(layout.player_totals[3], CellCoords::new(50, 9));
        assert_eq!(layout.driver_standings.first_col, 12);
        assert_eq!(layout.team_standings.header_row, 34);
        assert_eq!(layout.wildcards.dnfs.header_row, 54);
        assert_eq!(layout.wildcards.dnfs.first_col, 13);
    }

    #[test]
    fn a1_handles_multi_letter_columns() {
        assert_eq!(CellCoords::new(4, 1).a1(), "A4");
        assert_eq!(CellCoords::new(7, 26).a1(), "Z7");
        assert_eq!(CellCoords::new(7, 28).a1(), "AB7");
    }
}
