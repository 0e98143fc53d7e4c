use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::config::{AppConfig, CellCoords, TableCoords};
use crate::names::{EntityKind, NameMap};
use crate::rank::{
    DRIVER_STANDINGS_DROP, DenseRanking, RankMapping, TEAM_STANDINGS_DROP, WildcardCategory,
    credited_drivers, rank_results_table,
};
use crate::results_fetch::{ResultsFetcher, ResultsTable};
use crate::schedule::{RaceRecord, ScheduleStore};
use crate::scheduler::RaceweekUpdater;
use crate::score::{Scoreboard, player_total, score_scoreboard, score_wildcard_picks};
use crate::sheet::{CellValue, Sheet, SheetTable};
use crate::tally::{RaceweekIncrements, WildcardTally, increments_from};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Updated,
    /// Source had nothing to offer yet; retried on a later cycle.
    Unavailable(String),
    Failed(String),
}

impl TaskOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, TaskOutcome::Updated)
    }

    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => TaskOutcome::Updated,
            Err(err) => TaskOutcome::Failed(format!("{err:#}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTask {
    DriverStandings,
    TeamStandings,
    Wildcard(WildcardCategory),
    WildcardPoints,
    PredictionScores,
    Totals,
}

impl fmt::Display for UpdateTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateTask::DriverStandings => f.write_str("Drivers Championship"),
            UpdateTask::TeamStandings => f.write_str("Constructors Championship"),
            UpdateTask::Wildcard(category) => write!(f, "{category}"),
            UpdateTask::WildcardPoints => f.write_str("Wildcard points"),
            UpdateTask::PredictionScores => f.write_str("Prediction scores"),
            UpdateTask::Totals => f.write_str("Player totals"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub raceweek: u32,
    pub outcomes: Vec<(UpdateTask, TaskOutcome)>,
    pub cursor_before: u32,
    pub cursor_after: u32,
}

impl UpdateReport {
    pub fn outcome(&self, task: UpdateTask) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|(t, _)| *t == task)
            .map(|(_, outcome)| outcome)
    }

    pub fn cursor_advanced(&self) -> bool {
        self.cursor_after > self.cursor_before
    }
}

/// Runs one raceweek: fetch and rank in parallel, then persist on the calling
/// thread in a fixed order.
pub struct Orchestrator<'a, S: Sheet, F: ResultsFetcher> {
    config: &'a AppConfig,
    schedule: &'a ScheduleStore,
    sheet: &'a S,
    fetcher: &'a F,
    tally: &'a WildcardTally,
    pool: Option<rayon::ThreadPool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchJob {
    DriverStandings,
    TeamStandings,
    RaceResults,
    Qualifying,
    FastestLaps,
}

enum JobOutput {
    Standings(EntityKind, ResultsTable),
    Wildcards(Vec<Harvest>),
}

/// Per-raceweek credit for one category, collected up to the first raceweek
/// whose source came back empty.
struct Harvest {
    category: WildcardCategory,
    credited: Vec<(u32, RaceweekIncrements)>,
    gap: Option<String>,
}

impl Harvest {
    fn new(category: WildcardCategory) -> Self {
        Self {
            category,
            credited: Vec::new(),
            gap: None,
        }
    }
}

/// Everything a fetch job may look at. Only shared references to `Sync`
/// data, so jobs can run on any pool thread.
struct JobContext<'a, F: ResultsFetcher> {
    config: &'a AppConfig,
    schedule: &'a ScheduleStore,
    fetcher: &'a F,
    pending: &'a BTreeMap<WildcardCategory, Vec<u32>>,
}

impl<'a, S: Sheet, F: ResultsFetcher> Orchestrator<'a, S, F> {
    pub fn new(
        config: &'a AppConfig,
        schedule: &'a ScheduleStore,
        sheet: &'a S,
        fetcher: &'a F,
        tally: &'a WildcardTally,
    ) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.fetch_parallelism)
            .build()
            .ok();
        Self {
            config,
            schedule,
            sheet,
            fetcher,
            tally,
            pool,
        }
    }

    fn names(&self) -> &NameMap {
        &self.config.game.names
    }

    /// Last fully calculated raceweek; an empty cursor cell means 0.
    pub fn current_raceweek(&self) -> Result<u32> {
        let at = self.config.layout.cursor;
        let value = self.sheet.read_cell(at)?;
        if value.is_empty() {
            return Ok(0);
        }
        let raw = value
            .as_int()
            .ok_or_else(|| anyhow!("cursor cell {} holds {value:?}", at.a1()))?;
        u32::try_from(raw).with_context(|| format!("cursor cell {} is negative", at.a1()))
    }

    pub fn run_raceweek(&self, raceweek: u32, now: DateTime<Utc>) -> Result<UpdateReport> {
        self.schedule
            .race(raceweek)
            .ok_or_else(|| anyhow!("raceweek {raceweek} is not in the schedule"))?;
        let cursor_before = self.current_raceweek()?;
        tracing::info!("updating raceweek {raceweek} (cursor at {cursor_before})");

        let mut outcomes = Vec::new();
        let mut failed_categories = BTreeMap::new();
        let mut pending = BTreeMap::new();
        for category in WildcardCategory::ALL {
            match self.pending_raceweeks(category, raceweek) {
                Ok(list) => {
                    pending.insert(category, list);
                }
                Err(err) => {
                    failed_categories.insert(category, format!("{err:#}"));
                }
            }
        }

        let outputs = self.fetch_all(&pending);

        let mut driver_table = ResultsTable::default();
        let mut team_table = ResultsTable::default();
        let mut harvests = BTreeMap::new();
        for output in outputs {
            match output {
                JobOutput::Standings(EntityKind::Driver, table) => driver_table = table,
                JobOutput::Standings(EntityKind::Team, table) => team_table = table,
                JobOutput::Wildcards(list) => {
                    for harvest in list {
                        harvests.insert(harvest.category, harvest);
                    }
                }
            }
        }

        let (driver_outcome, driver_ranks) = self.write_standings(EntityKind::Driver, &driver_table);
        outcomes.push((UpdateTask::DriverStandings, driver_outcome));
        let (team_outcome, team_ranks) = self.write_standings(EntityKind::Team, &team_table);
        outcomes.push((UpdateTask::TeamStandings, team_outcome));

        let mut rankings = BTreeMap::new();
        for category in WildcardCategory::ALL {
            let outcome = match failed_categories.remove(&category) {
                Some(reason) => TaskOutcome::Failed(reason),
                None => match self.apply_wildcards(category, raceweek, harvests.remove(&category)) {
                    Ok((ranking, gap)) => {
                        rankings.insert(category, ranking);
                        gap.map_or(TaskOutcome::Updated, TaskOutcome::Unavailable)
                    }
                    Err(err) => TaskOutcome::Failed(format!("{err:#}")),
                },
            };
            outcomes.push((UpdateTask::Wildcard(category), outcome));
        }

        outcomes.push((
            UpdateTask::WildcardPoints,
            TaskOutcome::from_result(self.write_wildcard_points(&rankings)),
        ));

        let scores_outcome = match (driver_ranks, team_ranks) {
            (Some(drivers), Some(teams)) => {
                TaskOutcome::from_result(self.write_prediction_scores(&drivers, &teams))
            }
            _ => TaskOutcome::Unavailable("standings missing this cycle".to_string()),
        };
        outcomes.push((UpdateTask::PredictionScores, scores_outcome));

        outcomes.push((
            UpdateTask::Totals,
            TaskOutcome::from_result(self.write_totals()),
        ));

        for (task, outcome) in &outcomes {
            match outcome {
                TaskOutcome::Updated => tracing::info!("{task}: updated"),
                TaskOutcome::Unavailable(reason) => tracing::warn!("{task}: not updated, {reason}"),
                TaskOutcome::Failed(reason) => tracing::error!("{task}: failed, {reason}"),
            }
        }

        let complete = [
            UpdateTask::DriverStandings,
            UpdateTask::TeamStandings,
            UpdateTask::PredictionScores,
        ]
        .iter()
        .all(|task| {
            outcomes
                .iter()
                .any(|(t, outcome)| t == task && outcome.is_updated())
        });
        if complete && raceweek > cursor_before {
            self.sheet
                .write_cell(self.config.layout.cursor, CellValue::from(raceweek as usize))
                .context("advance raceweek cursor")?;
            tracing::info!("raceweek cursor advanced to {raceweek}");
        } else if !complete {
            tracing::warn!("raceweek {raceweek} incomplete; cursor stays at {cursor_before}");
        }

        let cursor_after = self.current_raceweek()?;
        if let Err(err) = self.write_tracker(cursor_after) {
            tracing::error!("points tracker: {err:#}");
        }
        if let Err(err) = self.log_update(now) {
            tracing::error!("run log: {err:#}");
        }

        Ok(UpdateReport {
            raceweek,
            outcomes,
            cursor_before,
            cursor_after,
        })
    }

    fn pending_raceweeks(&self, category: WildcardCategory, raceweek: u32) -> Result<Vec<u32>> {
        let recorded = self.tally.recorded_raceweeks(category)?;
        Ok((1..=raceweek).filter(|rw| !recorded.contains(rw)).collect())
    }

    fn fetch_all(&self, pending: &BTreeMap<WildcardCategory, Vec<u32>>) -> Vec<JobOutput> {
        let needs = |category: WildcardCategory| pending.get(&category).is_some_and(|p| !p.is_empty());
        let mut jobs = vec![FetchJob::DriverStandings, FetchJob::TeamStandings];
        if needs(WildcardCategory::Podiums) || needs(WildcardCategory::Dnfs) {
            jobs.push(FetchJob::RaceResults);
        }
        if needs(WildcardCategory::Poles) {
            jobs.push(FetchJob::Qualifying);
        }
        if needs(WildcardCategory::FastestLaps) {
            jobs.push(FetchJob::FastestLaps);
        }

        let ctx = JobContext {
            config: self.config,
            schedule: self.schedule,
            fetcher: self.fetcher,
            pending,
        };
        with_fetch_pool(&self.pool, || {
            jobs.par_iter()
                .map(|job| run_job(*job, &ctx))
                .collect::<Vec<_>>()
        })
    }

    fn write_standings(
        &self,
        kind: EntityKind,
        table: &ResultsTable,
    ) -> (TaskOutcome, Option<RankMapping>) {
        if table.is_empty() {
            return (
                TaskOutcome::Unavailable("standings table is empty".to_string()),
                None,
            );
        }
        let (coords, drop) = match kind {
            EntityKind::Driver => (&self.config.layout.driver_standings, DRIVER_STANDINGS_DROP),
            EntityKind::Team => (&self.config.layout.team_standings, TEAM_STANDINGS_DROP),
        };
        let ranks = rank_results_table(table, kind, self.names());
        let sheet_table = fit_to_region(&table.without_columns(drop), coords);
        match self.sheet.write_table(coords.origin(), &sheet_table, false) {
            Ok(()) => (TaskOutcome::Updated, Some(ranks)),
            Err(err) => (TaskOutcome::Failed(format!("{err:#}")), None),
        }
    }

    /// Record this cycle's harvest, then rebuild the count table from the tally.
    fn apply_wildcards(
        &self,
        category: WildcardCategory,
        raceweek: u32,
        harvest: Option<Harvest>,
    ) -> Result<(DenseRanking, Option<String>)> {
        let mut gap = None;
        if let Some(harvest) = harvest {
            for (rw, increments) in &harvest.credited {
                self.tally.record(category, *rw, increments)?;
            }
            gap = harvest.gap;
        }

        let counts = self.tally.season_counts(category, raceweek, self.names())?;
        let ranking = counts.dense_rank();
        let table = SheetTable {
            headers: vec![category.count_header().to_string(), "Rank".to_string()],
            index: ranking.rows.iter().map(|r| r.driver.clone()).collect(),
            rows: ranking
                .rows
                .iter()
                .map(|r| vec![CellValue::from(r.count as usize), CellValue::from(r.rank)])
                .collect(),
        };
        let coords = self.config.layout.wildcards.for_category(category);
        self.sheet
            .write_table(coords.origin(), &table, true)
            .with_context(|| format!("write {category} table"))?;
        Ok((ranking, gap))
    }

    fn write_wildcard_points(&self, rankings: &BTreeMap<WildcardCategory, DenseRanking>) -> Result<()> {
        let coords = &self.config.layout.wildcard_points;
        let players = self.config.game.players.len() as u32;
        for category in WildcardCategory::ALL {
            let row = category.row_index() as u32;
            self.sheet
                .write_cell(coords.data_cell(row, 0), CellValue::text(category.to_string()))?;
            let Some(ranking) = rankings.get(&category) else {
                continue;
            };
            let picks = (0..players)
                .map(|p| {
                    self.sheet
                        .read_cell(coords.data_cell(row, 1 + p * 2))
                        .map(|v| v.as_text())
                })
                .collect::<Result<Vec<_>>>()?;
            let scores = score_wildcard_picks(category, &picks, ranking, self.names());
            for (p, score) in scores.into_iter().enumerate() {
                let value = score.map(CellValue::from).unwrap_or_default();
                self.sheet
                    .write_cell(coords.data_cell(row, 2 + p as u32 * 2), value)?;
            }
        }

        let subtotal_row = WildcardCategory::ALL.len() as u32;
        self.sheet
            .write_cell(coords.data_cell(subtotal_row, 0), CellValue::text("Wildcard total"))?;
        for p in 0..players {
            let sum = player_total(&[], &self.wildcard_scores(p)?);
            self.sheet
                .write_cell(coords.data_cell(subtotal_row, 2 + p * 2), CellValue::from(sum))?;
        }
        Ok(())
    }

    fn write_prediction_scores(&self, drivers: &RankMapping, teams: &RankMapping) -> Result<()> {
        let coords = &self.config.layout.scoreboard;
        let table = self.sheet.read_table(coords).context("read scoreboard")?;
        let players = self.config.game.players.clone();
        let picks = (0..players.len())
            .map(|p| {
                (0..table.rows.len())
                    .map(|slot| table.cell(slot, p * 2).as_text())
                    .collect()
            })
            .collect();
        let board = Scoreboard { players, picks };
        let scores = score_scoreboard(&board, drivers, teams, self.config.game.prediction_drivers);
        for (p, player_scores) in scores.iter().enumerate() {
            for (slot, score) in player_scores.iter().enumerate() {
                self.sheet.write_cell(
                    coords.data_cell(slot as u32, p as u32 * 2 + 1),
                    CellValue::from(*score),
                )?;
            }
        }
        Ok(())
    }

    /// Totals are recomputed from whatever scores are on the sheet.
    fn write_totals(&self) -> Result<()> {
        let coords = &self.config.layout.scoreboard;
        for (p, at) in self.config.layout.player_totals.iter().enumerate() {
            let p = p as u32;
            let slot_scores = (0..coords.length)
                .map(|slot| {
                    self.sheet
                        .read_cell(coords.data_cell(slot, p * 2 + 1))
                        .map(|v| cell_score(&v).unwrap_or(0))
                })
                .collect::<Result<Vec<_>>>()?;
            let total = player_total(&slot_scores, &self.wildcard_scores(p)?);
            self.sheet.write_cell(*at, CellValue::from(total))?;
        }
        Ok(())
    }

    fn wildcard_scores(&self, player: u32) -> Result<Vec<Option<usize>>> {
        let coords = &self.config.layout.wildcard_points;
        WildcardCategory::ALL
            .iter()
            .map(|category| {
                self.sheet
                    .read_cell(coords.data_cell(category.row_index() as u32, 2 + player * 2))
                    .map(|v| cell_score(&v))
            })
            .collect()
    }

    fn write_tracker(&self, cursor: u32) -> Result<()> {
        if cursor == 0 {
            return Ok(());
        }
        let tracker = &self.config.layout.points_tracker;
        for (i, player) in self.config.game.players.iter().enumerate() {
            let col = tracker.first_col + i as u32;
            self.sheet.write_cell(
                CellCoords::new(tracker.header_row, col),
                CellValue::text(player.as_str()),
            )?;
            let total = self.sheet.read_cell(self.config.layout.player_totals[i])?;
            self.sheet
                .write_cell(CellCoords::new(tracker.header_row + cursor, col), total)?;
        }
        Ok(())
    }

    fn log_update(&self, now: DateTime<Utc>) -> Result<()> {
        let layout = &self.config.layout;
        self.sheet.write_cell(
            layout.last_updated,
            CellValue::text(now.date_naive().format("%Y-%m-%d").to_string()),
        )?;
        let next = self.schedule.next_upcoming(now);
        let (name, date) = match next {
            Some(race) => (CellValue::text(race.name.as_str()), race_date(race)),
            None => (CellValue::Empty, CellValue::Empty),
        };
        self.sheet.write_cell(layout.next_race_name, name)?;
        self.sheet.write_cell(layout.next_race_date, date)?;
        Ok(())
    }
}

impl<S: Sheet, F: ResultsFetcher> RaceweekUpdater for Orchestrator<'_, S, F> {
    fn current_raceweek(&self) -> Result<u32> {
        Orchestrator::current_raceweek(self)
    }

    fn result_is_ready(&self, race: &RaceRecord) -> bool {
        !self.fetcher.fetch_table(&race.results_url).is_empty()
    }

    fn run_update(&self, raceweek: u32, now: DateTime<Utc>) -> Result<()> {
        self.run_raceweek(raceweek, now).map(|_| ())
    }
}

/// Non-negative integer cells count as scores; anything else is blank.
fn cell_score(value: &CellValue) -> Option<usize> {
    value.as_int().and_then(|v| usize::try_from(v).ok())
}

fn race_date(race: &RaceRecord) -> CellValue {
    match (&race.date, race.start_time()) {
        (Some(date), _) if !date.trim().is_empty() => CellValue::text(date.trim()),
        (_, Some(start)) => CellValue::text(start.format("%Y-%m-%d").to_string()),
        _ => CellValue::Empty,
    }
}

fn with_fetch_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}

fn run_job<F: ResultsFetcher>(job: FetchJob, ctx: &JobContext<'_, F>) -> JobOutput {
    let names = &ctx.config.game.names;
    match job {
        FetchJob::DriverStandings => JobOutput::Standings(
            EntityKind::Driver,
            ctx.fetcher.fetch_table(&ctx.config.standings_url("drivers")),
        ),
        FetchJob::TeamStandings => JobOutput::Standings(
            EntityKind::Team,
            ctx.fetcher.fetch_table(&ctx.config.standings_url("team")),
        ),
        FetchJob::RaceResults => {
            JobOutput::Wildcards(harvest_race_results(ctx, names))
        }
        FetchJob::Qualifying => {
            JobOutput::Wildcards(vec![harvest_poles(ctx, names)])
        }
        FetchJob::FastestLaps => {
            JobOutput::Wildcards(vec![harvest_fastest_laps(ctx, names)])
        }
    }
}

fn pending_for<'a, F: ResultsFetcher>(
    ctx: &'a JobContext<'_, F>,
    category: WildcardCategory,
) -> &'a [u32] {
    ctx.pending.get(&category).map(Vec::as_slice).unwrap_or_default()
}

/// Podiums and DNFs come from the same race-result page.
fn harvest_race_results<F: ResultsFetcher>(ctx: &JobContext<'_, F>, names: &NameMap) -> Vec<Harvest> {
    let categories = [WildcardCategory::Podiums, WildcardCategory::Dnfs];
    let mut harvests = categories.map(Harvest::new);
    let wanted = categories
        .iter()
        .flat_map(|c| pending_for(ctx, *c).iter().copied())
        .collect::<BTreeSet<_>>();

    for rw in wanted {
        let table = match ctx.schedule.race(rw) {
            Some(race) => ctx.fetcher.fetch_table(&race.results_url),
            None => ResultsTable::default(),
        };
        if table.is_empty() {
            let reason = format!("no race results for raceweek {rw}");
            for harvest in harvests.iter_mut() {
                if pending_for(ctx, harvest.category).iter().any(|p| *p >= rw) {
                    harvest.gap = Some(reason.clone());
                }
            }
            break;
        }
        for harvest in harvests.iter_mut() {
            if pending_for(ctx, harvest.category).contains(&rw) {
                let drivers = credited_drivers(harvest.category, &table, names);
                harvest.credited.push((rw, increments_from(&drivers)));
            }
        }
    }
    harvests.into_iter().collect()
}

fn harvest_poles<F: ResultsFetcher>(ctx: &JobContext<'_, F>, names: &NameMap) -> Harvest {
    let mut harvest = Harvest::new(WildcardCategory::Poles);
    for &rw in pending_for(ctx, WildcardCategory::Poles) {
        let Some(url) = ctx.schedule.race(rw).and_then(RaceRecord::qualifying_url) else {
            tracing::error!("raceweek {rw}: results url does not end in race-result");
            harvest.gap = Some(format!("no qualifying url for raceweek {rw}"));
            break;
        };
        let table = ctx.fetcher.fetch_table(&url);
        if table.is_empty() {
            harvest.gap = Some(format!("no qualifying results for raceweek {rw}"));
            break;
        }
        let drivers = credited_drivers(WildcardCategory::Poles, &table, names);
        harvest.credited.push((rw, increments_from(&drivers)));
    }
    harvest
}

/// The season fastest-laps table has one row per race, in raceweek order.
fn harvest_fastest_laps<F: ResultsFetcher>(ctx: &JobContext<'_, F>, names: &NameMap) -> Harvest {
    let mut harvest = Harvest::new(WildcardCategory::FastestLaps);
    let table = ctx
        .fetcher
        .fetch_table(&ctx.config.standings_url("fastest-laps"));
    for &rw in pending_for(ctx, WildcardCategory::FastestLaps) {
        let Some(row) = table.rows.get(rw as usize - 1) else {
            harvest.gap = Some(format!("fastest laps table has no row for raceweek {rw}"));
            break;
        };
        let single = ResultsTable {
            headers: table.headers.clone(),
            rows: vec![row.clone()],
        };
        let drivers = credited_drivers(WildcardCategory::FastestLaps, &single, names);
        harvest.credited.push((rw, increments_from(&drivers)));
    }
    harvest
}

/// Clip or pad `table` to the fixed region so stale rows from a longer
/// previous table do not linger.
fn fit_to_region(table: &ResultsTable, coords: &TableCoords) -> SheetTable {
    let width = table.headers.len().max(coords.width as usize);
    let mut headers = table.headers.clone();
    headers.resize(width, String::new());
    let mut rows = table
        .rows
        .iter()
        .take(coords.length as usize)
        .map(|row| {
            let mut cells = row.iter().map(|c| CellValue::text(c.as_str())).collect::<Vec<_>>();
            cells.resize(width, CellValue::Empty);
            cells
        })
        .collect::<Vec<_>>();
    rows.resize(coords.length as usize, vec![CellValue::Empty; width]);
    SheetTable {
        headers,
        index: Vec::new(),
        rows,
    }
}
