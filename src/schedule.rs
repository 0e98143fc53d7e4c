use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceRecord {
    pub raceweek: u32,
    pub name: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(alias = "results")]
    pub results_url: String,
    #[serde(default)]
    pub date: Option<String>,
}

impl RaceRecord {
    /// Race start in UTC. Naive timestamps are taken as UTC; placeholders such
    /// as `"N/A"` yield `None`.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        parse_race_time(self.time.as_deref()?)
    }

    /// Qualifying page for the same event, derived from the race-result URL.
    pub fn qualifying_url(&self) -> Option<String> {
        let base = self.results_url.trim_end_matches('/');
        let prefix = base.strip_suffix("race-result")?;
        Some(format!("{prefix}qualifying"))
    }
}

pub fn parse_race_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("race schedule is empty")]
    Empty,
    #[error("raceweeks must run 1..={expected_last} without gaps; found {found} at position {position}")]
    NonContiguous {
        expected_last: usize,
        found: u32,
        position: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleStore {
    races: Vec<RaceRecord>,
}

impl ScheduleStore {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read race schedule {}", path.display()))?;
        let races: Vec<RaceRecord> =
            serde_json::from_str(&raw).context("invalid race schedule json")?;
        Ok(Self::from_races(races)?)
    }

    pub fn from_races(mut races: Vec<RaceRecord>) -> Result<Self, ScheduleError> {
        if races.is_empty() {
            return Err(ScheduleError::Empty);
        }
        races.sort_by_key(|r| r.raceweek);
        for (position, race) in races.iter().enumerate() {
            if race.raceweek as usize != position + 1 {
                return Err(ScheduleError::NonContiguous {
                    expected_last: races.len(),
                    found: race.raceweek,
                    position,
                });
            }
        }
        Ok(Self { races })
    }

    pub fn races(&self) -> &[RaceRecord] {
        &self.races
    }

    pub fn race(&self, raceweek: u32) -> Option<&RaceRecord> {
        let idx = (raceweek as usize).checked_sub(1)?;
        self.races.get(idx)
    }

    pub fn last_raceweek(&self) -> u32 {
        self.races.last().map(|r| r.raceweek).unwrap_or(0)
    }

    /// First race whose start time is still in the future.
    pub fn next_upcoming(&self, now: DateTime<Utc>) -> Option<&RaceRecord> {
        self.races
            .iter()
            .find(|race| race.start_time().is_some_and(|t| now < t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn race(raceweek: u32, time: &str) -> RaceRecord {
        RaceRecord {
            raceweek,
            name: format!("race-{raceweek}"),
            time: Some(time.to_string()),
            results_url: format!(
                "https://www.formula1.com/en/results/2025/races/{raceweek}/x/race-result"
            ),
            date: None,
        }
    }

    #[test]
    fn parses_naive_and_offset_times() {
        let expected = Utc.with_ymd_and_hms(2025, 5, 4, 13, 0, 0).unwrap();
        assert_eq!(parse_race_time("2025-05-04T13:00:00"), Some(expected));
        assert_eq!(parse_race_time("2025-05-04 13:00:00"), Some(expected));
        assert_eq!(parse_race_time("2025-05-04T15:00:00+02:00"), Some(expected));
        assert_eq!(parse_race_time("N/A"), None);
    }

    #[test]
    fn loads_results_alias_and_date() {
        let raw = r#"[{"name":"miami","date":"02 - 04 May","time":"2025-05-04 20:00:00","raceweek":1,
                       "results":"https://www.formula1.com/en/results/2025/races/1264/miami/race-result"}]"#;
        let races: Vec<RaceRecord> = serde_json::from_str(raw).unwrap();
        let store = ScheduleStore::from_races(races).unwrap();
        let miami = store.race(1).unwrap();
        assert_eq!(
            miami.qualifying_url().as_deref(),
            Some("https://www.formula1.com/en/results/2025/races/1264/miami/qualifying")
        );
        assert!(store.race(0).is_none());
        assert!(store.race(2).is_none());
    }

    #[test]
    fn rejects_gaps_in_raceweeks() {
        let err = ScheduleStore::from_races(vec![race(1, "2025-03-16T04:00:00"), race(3, "2025-04-06T05:00:00")])
            .unwrap_err();
        assert!(matches!(err, ScheduleError::NonContiguous { found: 3, .. }));
        assert!(matches!(ScheduleStore::from_races(Vec::new()), Err(ScheduleError::Empty)));
    }

    #[test]
    fn next_upcoming_skips_unparseable_times() {
        let mut broken = race(2, "N/A");
        broken.time = Some("N/A".to_string());
        let store = ScheduleStore::from_races(vec![
            race(1, "2025-03-16T04:00:00"),
            broken,
            race(3, "2025-04-06T05:00:00"),
        ])
        .unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap();
        assert_eq!(store.next_upcoming(now).map(|r| r.raceweek), Some(3));
    }

    #[test]
    fn qualifying_url_requires_race_result_suffix() {
        let mut r = race(1, "2025-03-16T04:00:00");
        r.results_url = "https://example.test/results".to_string();
        assert_eq!(r.qualifying_url(), None);
    }
}
