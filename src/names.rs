use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Driver,
    Team,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("driver field {0:?} does not end in a three-letter code")]
    MalformedDriverField(String),
    #[error("unrecognized driver code {0:?}")]
    UnknownDriverCode(String),
    #[error("unrecognized team {0:?}")]
    UnknownTeam(String),
}

/// Results-site identifiers mapped onto the short names players use in their
/// predictions. Order matters: it seeds wildcard tables and breaks count ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameMap {
    pub drivers: Vec<NameEntry>,
    pub teams: Vec<NameEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameEntry {
    pub source: String,
    pub name: String,
}

impl NameMap {
    pub fn season_2025() -> Self {
        Self {
            drivers: entries(SEASON_2025_DRIVERS),
            teams: entries(SEASON_2025_TEAMS),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read name map {}", path.display()))?;
        serde_json::from_str(&raw).context("invalid name map json")
    }

    pub fn driver_names(&self) -> impl Iterator<Item = &str> {
        self.drivers.iter().map(|e| e.name.as_str())
    }

    pub fn team_names(&self) -> impl Iterator<Item = &str> {
        self.teams.iter().map(|e| e.name.as_str())
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_known_driver(&self, name: &str) -> bool {
        self.drivers.iter().any(|e| e.name == name)
    }

    /// Resolve a results-table driver cell such as `"Max Verstappen VER"`.
    pub fn resolve_driver(&self, raw: &str) -> Result<&str, EntityError> {
        let code = parse_driver_code(raw)?;
        self.drivers
            .iter()
            .find(|e| e.source == code)
            .map(|e| e.name.as_str())
            .ok_or_else(|| EntityError::UnknownDriverCode(code.to_string()))
    }

    pub fn resolve_team(&self, raw: &str) -> Result<&str, EntityError> {
        let key = raw.trim();
        self.teams
            .iter()
            .find(|e| e.source == key)
            .map(|e| e.name.as_str())
            .ok_or_else(|| EntityError::UnknownTeam(key.to_string()))
    }

    pub fn resolve(&self, kind: EntityKind, raw: &str) -> Result<&str, EntityError> {
        match kind {
            EntityKind::Driver => self.resolve_driver(raw),
            EntityKind::Team => self.resolve_team(raw),
        }
    }
}

/// The results site renders the driver column as first name, surname and the
/// three-letter code run together. Only a trailing block of exactly three
/// uppercase ASCII letters is accepted.
pub fn parse_driver_code(raw: &str) -> Result<&str, EntityError> {
    let trimmed = raw.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() < 3 {
        return Err(EntityError::MalformedDriverField(raw.to_string()));
    }
    let split = bytes.len() - 3;
    let code = &bytes[split..];
    if !code.iter().all(|b| b.is_ascii_uppercase()) {
        return Err(EntityError::MalformedDriverField(raw.to_string()));
    }
    // "ABCD" would otherwise yield "BCD".
    if split > 0 && bytes[split - 1].is_ascii_uppercase() {
        return Err(EntityError::MalformedDriverField(raw.to_string()));
    }
    Ok(&trimmed[split..])
}

fn entries(pairs: &[(&str, &str)]) -> Vec<NameEntry> {
    pairs
        .iter()
        .map(|(source, name)| NameEntry {
            source: source.to_string(),
            name: name.to_string(),
        })
        .collect()
}

const SEASON_2025_DRIVERS: &[(&str, &str)] = &[
    ("VER", "Verstappen"),
    ("LAW", "Lawson"),
    ("NOR", "Norris"),
    ("PIA", "Piastri"),
    ("HAM", "Hamilton"),
    ("LEC", "Leclerc"),
    ("SAI", "Sainz"),
    ("ALB", "Albon"),
    ("RUS", "Russell"),
    ("ANT", "Antonelli"),
    ("OCO", "Ocon"),
    ("BEA", "Bearman"),
    ("ALO", "Alonso"),
    ("STR", "Stroll"),
    ("GAS", "Gasly"),
    ("DOO", "Doohan"),
    ("TSU", "Tsunoda"),
    ("HAD", "Hadjar"),
    ("HUL", "Hulkenberg"),
    ("BOR", "Bortoleto"),
];

const SEASON_2025_TEAMS: &[(&str, &str)] = &[
    ("Red Bull Racing Honda RBPT", "Red Bull"),
    ("Aston Martin Aramco Mercedes", "Aston Martin"),
    ("Mercedes", "Mercedes"),
    ("Ferrari", "Ferrari"),
    ("Kick Sauber Ferrari", "Stake"),
    ("Alpine Renault", "Alpine"),
    ("Williams Mercedes", "Williams"),
    ("Racing Bulls Honda RBPT", "Racing Bulls"),
    ("Haas Ferrari", "Haas"),
    ("McLaren Mercedes", "Mclaren"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_code_parse_accepts_trailing_code() {
        assert_eq!(parse_driver_code("Max Verstappen VER"), Ok("VER"));
        assert_eq!(parse_driver_code("Lando NorrisNOR"), Ok("NOR"));
        assert_eq!(parse_driver_code(" PIA "), Ok("PIA"));
    }

    #[test]
    fn driver_code_parse_fails_closed() {
        assert!(parse_driver_code("Ve").is_err());
        assert!(parse_driver_code("Max Verstappen").is_err());
        assert!(parse_driver_code("Max Verstappen Ver").is_err());
        assert!(parse_driver_code("HAAS").is_err());
    }

    #[test]
    fn resolves_known_entities_only() {
        let names = NameMap::season_2025();
        assert_eq!(names.resolve_driver("Oscar Piastri PIA"), Ok("Piastri"));
        assert_eq!(
            names.resolve_driver("Mick Schumacher MSC"),
            Err(EntityError::UnknownDriverCode("MSC".to_string()))
        );
        assert_eq!(names.resolve_team("McLaren Mercedes"), Ok("Mclaren"));
        assert!(names.resolve_team("Brawn GP").is_err());
        assert_eq!(names.driver_count(), 20);
    }
}
