use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::names::NameMap;
use crate::rank::{WildcardCategory, WildcardCount};

/// Per-raceweek wildcard increments. Season counts are the fold of every
/// recorded raceweek, so each cycle only needs to fetch the raceweeks that
/// are still missing.
pub struct WildcardTally {
    conn: Connection,
}

/// Drivers credited in one raceweek for one category. An empty map is a
/// valid record (e.g. a race without retirements).
pub type RaceweekIncrements = BTreeMap<String, u32>;

impl WildcardTally {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open tally db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory tally")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn recorded_raceweeks(&self, category: WildcardCategory) -> Result<BTreeSet<u32>> {
        let mut stmt = self
            .conn
            .prepare("SELECT raceweek FROM recorded_raceweeks WHERE category = ?1")
            .context("prepare recorded raceweeks query")?;
        let rows = stmt
            .query_map(params![category.key()], |row| row.get::<_, u32>(0))
            .context("query recorded raceweeks")?;
        let mut out = BTreeSet::new();
        for row in rows {
            out.insert(row.context("decode recorded raceweek")?);
        }
        Ok(out)
    }

    /// Replace whatever was stored for `(category, raceweek)`.
    pub fn record(
        &self,
        category: WildcardCategory,
        raceweek: u32,
        increments: &RaceweekIncrements,
    ) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin tally transaction")?;
        tx.execute(
            "DELETE FROM increments WHERE category = ?1 AND raceweek = ?2",
            params![category.key(), raceweek],
        )
        .context("clear raceweek increments")?;
        for (driver, count) in increments {
            tx.execute(
                "INSERT INTO increments (category, raceweek, driver, count) VALUES (?1, ?2, ?3, ?4)",
                params![category.key(), raceweek, driver, count],
            )
            .context("insert increment")?;
        }
        tx.execute(
            r#"
            INSERT INTO recorded_raceweeks (category, raceweek, recorded_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(category, raceweek) DO UPDATE SET recorded_at = excluded.recorded_at
            "#,
            params![category.key(), raceweek, Utc::now().to_rfc3339()],
        )
        .context("mark raceweek recorded")?;
        tx.commit().context("commit tally transaction")?;
        Ok(())
    }

    /// Season-to-date counts for `category`, folded over raceweeks `1..=through`.
    pub fn season_counts(
        &self,
        category: WildcardCategory,
        through: u32,
        names: &NameMap,
    ) -> Result<WildcardCount> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT driver, SUM(count) FROM increments
                WHERE category = ?1 AND raceweek <= ?2
                GROUP BY driver
                "#,
            )
            .context("prepare season counts query")?;
        let rows = stmt
            .query_map(params![category.key(), through], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })
            .context("query season counts")?;

        let mut counts = WildcardCount::seeded(names);
        for row in rows {
            let (driver, count) = row.context("decode season count")?;
            if !counts.add(&driver, count) {
                tracing::warn!("{category}: tally holds {driver:?}, which is not in the name map");
            }
        }
        Ok(counts)
    }

    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM increments; DELETE FROM recorded_raceweeks;")
            .context("clear tally")?;
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS increments (
            category TEXT NOT NULL,
            raceweek INTEGER NOT NULL,
            driver TEXT NOT NULL,
            count INTEGER NOT NULL,
            PRIMARY KEY (category, raceweek, driver)
        );
        CREATE TABLE IF NOT EXISTS recorded_raceweeks (
            category TEXT NOT NULL,
            raceweek INTEGER NOT NULL,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (category, raceweek)
        );
        "#,
    )
    .context("create tally schema")?;
    Ok(())
}

pub fn increments_from(drivers: &[String]) -> RaceweekIncrements {
    let mut out = RaceweekIncrements::new();
    for driver in drivers {
        *out.entry(driver.clone()).or_insert(0) += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerecording_a_raceweek_replaces_it() {
        let names = NameMap::season_2025();
        let tally = WildcardTally::open_in_memory().unwrap();
        let podium = increments_from(&["Piastri".to_string(), "Norris".to_string()]);
        tally.record(WildcardCategory::Podiums, 1, &podium).unwrap();
        tally.record(WildcardCategory::Podiums, 1, &podium).unwrap();
        tally
            .record(WildcardCategory::Podiums, 2, &increments_from(&["Norris".to_string()]))
            .unwrap();

        let counts = tally
            .season_counts(WildcardCategory::Podiums, 2, &names)
            .unwrap();
        assert_eq!(counts.get("Norris"), Some(2));
        assert_eq!(counts.get("Piastri"), Some(1));
        assert_eq!(counts.get("Verstappen"), Some(0));

        let through_first = tally
            .season_counts(WildcardCategory::Podiums, 1, &names)
            .unwrap();
        assert_eq!(through_first.get("Norris"), Some(1));
    }

    #[test]
    fn empty_records_still_mark_raceweek() {
        let tally = WildcardTally::open_in_memory().unwrap();
        tally
            .record(WildcardCategory::Dnfs, 3, &RaceweekIncrements::new())
            .unwrap();
        let recorded = tally.recorded_raceweeks(WildcardCategory::Dnfs).unwrap();
        assert_eq!(recorded.into_iter().collect::<Vec<_>>(), vec![3]);
        assert!(tally.recorded_raceweeks(WildcardCategory::Poles).unwrap().is_empty());
    }

    #[test]
    fn clear_forgets_everything() {
        let tally = WildcardTally::open_in_memory().unwrap();
        tally
            .record(WildcardCategory::Poles, 1, &increments_from(&["Norris".to_string()]))
            .unwrap();
        tally.clear().unwrap();
        assert!(tally.recorded_raceweeks(WildcardCategory::Poles).unwrap().is_empty());
    }
}
