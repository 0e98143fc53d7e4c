use std::collections::HashMap;
use std::fmt;

use crate::names::{EntityKind, NameMap};
use crate::results_fetch::ResultsTable;

/// Canonical entity name -> zero-based rank.
pub type RankMapping = HashMap<String, usize>;

pub const DRIVER_STANDINGS_DROP: &[&str] = &["Nationality", "Car", "Pos"];
pub const TEAM_STANDINGS_DROP: &[&str] = &["Pos"];

/// Rank each row by its position in the table. Rows whose key does not
/// resolve keep their slot (later rows are not shifted up) and are left out.
pub fn build_standings_rank<'a>(
    keys: impl IntoIterator<Item = &'a str>,
    kind: EntityKind,
    names: &NameMap,
) -> RankMapping {
    let mut ranks = RankMapping::new();
    for (position, raw) in keys.into_iter().enumerate() {
        if raw.trim().is_empty() {
            continue;
        }
        match names.resolve(kind, raw) {
            Ok(name) => {
                ranks.entry(name.to_string()).or_insert(position);
            }
            Err(err) => tracing::warn!("standings row {position} skipped: {err}"),
        }
    }
    ranks
}

pub fn standings_key_column(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Driver => "Driver",
        EntityKind::Team => "Team",
    }
}

pub fn rank_results_table(table: &ResultsTable, kind: EntityKind, names: &NameMap) -> RankMapping {
    let Some(keys) = table.column(standings_key_column(kind)) else {
        tracing::warn!(
            "standings table has no {:?} column",
            standings_key_column(kind)
        );
        return RankMapping::new();
    };
    build_standings_rank(keys, kind, names)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WildcardCategory {
    Poles,
    FastestLaps,
    Podiums,
    Dnfs,
}

impl WildcardCategory {
    pub const ALL: [WildcardCategory; 4] = [
        WildcardCategory::Poles,
        WildcardCategory::FastestLaps,
        WildcardCategory::Podiums,
        WildcardCategory::Dnfs,
    ];

    /// Row of this category in the wildcard points table.
    pub fn row_index(self) -> usize {
        match self {
            WildcardCategory::Poles => 0,
            WildcardCategory::FastestLaps => 1,
            WildcardCategory::Podiums => 2,
            WildcardCategory::Dnfs => 3,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            WildcardCategory::Poles => "poles",
            WildcardCategory::FastestLaps => "fastest_laps",
            WildcardCategory::Podiums => "podiums",
            WildcardCategory::Dnfs => "dnfs",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }

    pub fn count_header(self) -> &'static str {
        match self {
            WildcardCategory::Poles => "Pole Count",
            WildcardCategory::FastestLaps => "FL Count",
            WildcardCategory::Podiums => "Podium Count",
            WildcardCategory::Dnfs => "DNF Count",
        }
    }
}

impl fmt::Display for WildcardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WildcardCategory::Poles => "Pole positions",
            WildcardCategory::FastestLaps => "Fastest Laps",
            WildcardCategory::Podiums => "Podiums",
            WildcardCategory::Dnfs => "DNFs",
        };
        f.write_str(label)
    }
}

/// Drivers credited by one race table for `category`. A driver may appear
/// more than once only for the season fastest-laps table, which is split per
/// race by the caller.
pub fn credited_drivers(
    category: WildcardCategory,
    table: &ResultsTable,
    names: &NameMap,
) -> Vec<String> {
    let Some(drivers) = table.column("Driver") else {
        tracing::warn!("{category} table has no Driver column");
        return Vec::new();
    };
    let selected: Vec<&str> = match category {
        WildcardCategory::Poles => drivers.into_iter().take(1).collect(),
        WildcardCategory::FastestLaps => drivers,
        WildcardCategory::Podiums => {
            let Some(positions) = table.column("Pos") else {
                tracing::warn!("{category} table has no Pos column");
                return Vec::new();
            };
            drivers
                .into_iter()
                .zip(positions)
                .filter(|(_, pos)| matches!(pos.trim(), "1" | "2" | "3"))
                .map(|(driver, _)| driver)
                .collect()
        }
        WildcardCategory::Dnfs => {
            let Some(status) = table.column("Time/retired") else {
                tracing::warn!("{category} table has no Time/retired column");
                return Vec::new();
            };
            drivers
                .into_iter()
                .zip(status)
                .filter(|(_, s)| s.trim() == "DNF")
                .map(|(driver, _)| driver)
                .collect()
        }
    };

    let mut out = Vec::with_capacity(selected.len());
    for raw in selected {
        match names.resolve_driver(raw) {
            Ok(name) => out.push(name.to_string()),
            Err(err) => tracing::warn!("{category}: {err}"),
        }
    }
    out
}

/// Season counts in name-map order, every known driver present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardCount {
    counts: Vec<(String, u32)>,
}

impl WildcardCount {
    pub fn seeded(names: &NameMap) -> Self {
        Self {
            counts: names.driver_names().map(|n| (n.to_string(), 0)).collect(),
        }
    }

    /// Unknown drivers are ignored.
    pub fn add(&mut self, driver: &str, n: u32) -> bool {
        match self.counts.iter_mut().find(|(name, _)| name == driver) {
            Some((_, count)) => {
                *count += n;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, driver: &str) -> Option<u32> {
        self.counts
            .iter()
            .find(|(name, _)| name == driver)
            .map(|(_, c)| *c)
    }

    pub fn dense_rank(&self) -> DenseRanking {
        dense_rank(&self.counts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedCount {
    pub driver: String,
    pub count: u32,
    pub rank: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenseRanking {
    pub rows: Vec<RankedCount>,
}

impl DenseRanking {
    pub fn rank_of(&self, driver: &str) -> Option<usize> {
        self.rows.iter().find(|r| r.driver == driver).map(|r| r.rank)
    }
}

/// Sort by count descending (stable, so ties keep input order) and assign
/// zero-based dense ranks: equal counts share a rank, the next distinct count
/// gets the next integer.
pub fn dense_rank(counts: &[(String, u32)]) -> DenseRanking {
    let mut sorted = counts.to_vec();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));

    let mut rows = Vec::with_capacity(sorted.len());
    let mut rank = 0usize;
    let mut previous: Option<u32> = None;
    for (driver, count) in sorted {
        if let Some(prev) = previous
            && prev != count
        {
            rank += 1;
        }
        previous = Some(count);
        rows.push(RankedCount {
            driver,
            count,
            rank,
        });
    }
    DenseRanking { rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> ResultsTable {
        ResultsTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn standings_rank_keeps_row_positions_and_skips_unknowns() {
        let names = NameMap::season_2025();
        let t = table(
            &["Driver", "Pts"],
            &[
                &["Oscar Piastri PIA", "131"],
                &["Some Reserve XYZ", "120"],
                &["Lando Norris NOR", "115"],
                &["garbage", "0"],
            ],
        );
        let ranks = rank_results_table(&t, EntityKind::Driver, &names);
        assert_eq!(ranks.len(), 2);
        assert_eq!(ranks.get("Piastri"), Some(&0));
        assert_eq!(ranks.get("Norris"), Some(&2));
    }

    #[test]
    fn team_standings_key_on_full_team_string() {
        let names = NameMap::season_2025();
        let t = table(&["Team", "Pts"], &[&["McLaren Mercedes", "246"], &["Ferrari", "94"]]);
        let ranks = rank_results_table(&t, EntityKind::Team, &names);
        assert_eq!(ranks.get("Mclaren"), Some(&0));
        assert_eq!(ranks.get("Ferrari"), Some(&1));
    }

    #[test]
    fn dense_rank_shares_ties_without_gaps() {
        let counts = vec![
            ("A".to_string(), 1),
            ("B".to_string(), 3),
            ("C".to_string(), 3),
            ("D".to_string(), 0),
            ("E".to_string(), 1),
        ];
        let ranking = dense_rank(&counts);
        let order = ranking
            .rows
            .iter()
            .map(|r| (r.driver.as_str(), r.rank))
            .collect::<Vec<_>>();
        assert_eq!(order, vec![("B", 0), ("C", 0), ("A", 1), ("E", 1), ("D", 2)]);
    }

    #[test]
    fn dense_rank_is_monotone_and_contiguous() {
        let counts = (0..20u32)
            .map(|i| (format!("d{i}"), (i * 7) % 5))
            .collect::<Vec<_>>();
        let ranking = dense_rank(&counts);
        for a in &ranking.rows {
            for b in &ranking.rows {
                if a.count > b.count {
                    assert!(a.rank < b.rank);
                }
                if a.count == b.count {
                    assert_eq!(a.rank, b.rank);
                }
            }
        }
        let mut ranks = ranking.rows.iter().map(|r| r.rank).collect::<Vec<_>>();
        ranks.dedup();
        assert_eq!(ranks, (0..ranks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn seeded_counts_rank_zero_occurrence_drivers() {
        let names = NameMap::season_2025();
        let mut counts = WildcardCount::seeded(&names);
        assert!(counts.add("Norris", 2));
        assert!(!counts.add("Schumacher", 1));
        let ranking = counts.dense_rank();
        assert_eq!(ranking.rows.len(), 20);
        assert_eq!(ranking.rank_of("Norris"), Some(0));
        assert_eq!(ranking.rank_of("Verstappen"), Some(1));
    }

    #[test]
    fn credited_drivers_per_category() {
        let names = NameMap::season_2025();
        let race = table(
            &["Pos", "No", "Driver", "Car", "Laps", "Time/retired", "Pts"],
            &[
                &["1", "81", "Oscar Piastri PIA", "McLaren", "57", "1:35:39.435", "25"],
                &["2", "63", "George Russell RUS", "Mercedes", "57", "+15.499s", "18"],
                &["3", "4", "Lando Norris NOR", "McLaren", "57", "+16.273s", "15"],
                &["4", "16", "Charles Leclerc LEC", "Ferrari", "57", "+19.679s", "12"],
                &["NC", "7", "Jack Doohan DOO", "Alpine", "0", "DNF", "0"],
            ],
        );
        assert_eq!(
            credited_drivers(WildcardCategory::Podiums, &race, &names),
            vec!["Piastri", "Russell", "Norris"]
        );
        assert_eq!(credited_drivers(WildcardCategory::Dnfs, &race, &names), vec!["Doohan"]);
        assert_eq!(credited_drivers(WildcardCategory::Poles, &race, &names), vec!["Piastri"]);
    }
}
