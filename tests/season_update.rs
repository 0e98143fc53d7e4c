use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use f1_predictions::config::{AppConfig, CellCoords, GameConfig, SchedulerConfig};
use f1_predictions::orchestrator::{Orchestrator, TaskOutcome, UpdateTask};
use f1_predictions::rank::WildcardCategory;
use f1_predictions::results_fetch::{ResultsFetcher, ResultsTable, parse_first_table};
use f1_predictions::schedule::ScheduleStore;
use f1_predictions::scheduler::{Clock, PassOutcome, Scheduler};
use f1_predictions::seed::{parse_predictions, seed_sheet};
use f1_predictions::sheet::{CellValue, Sheet, SqliteSheet};
use f1_predictions::tally::WildcardTally;

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("fixture file should be readable")
}

#[derive(Clone)]
struct FakeClock {
    secs: Arc<AtomicI64>,
}

impl FakeClock {
    fn at(now: DateTime<Utc>) -> Self {
        Self {
            secs: Arc::new(AtomicI64::new(now.timestamp())),
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.secs.load(Ordering::SeqCst), 0).expect("valid timestamp")
    }

    fn sleep(&self, duration: Duration) {
        self.secs.fetch_add(duration.as_secs() as i64, Ordering::SeqCst);
    }
}

/// Serves the same fixture page for every race; pages whose url contains
/// `gated` only appear once the clock reaches `opens_at`.
struct FixtureFetcher {
    clock: FakeClock,
    gated: &'static str,
    opens_at: DateTime<Utc>,
}

impl FixtureFetcher {
    fn always_open(clock: FakeClock) -> Self {
        Self {
            clock,
            gated: "",
            opens_at: Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
        }
    }
}

impl ResultsFetcher for FixtureFetcher {
    fn fetch_table(&self, url: &str) -> ResultsTable {
        if !self.gated.is_empty() && url.contains(self.gated) && self.clock.now() < self.opens_at {
            return ResultsTable::default();
        }
        let fixture = if url.ends_with("/drivers") {
            "driver_standings.html"
        } else if url.ends_with("/team") {
            "team_standings.html"
        } else if url.ends_with("/fastest-laps") {
            "fastest_laps.html"
        } else if url.ends_with("/race-result") {
            "race_result.html"
        } else if url.ends_with("/qualifying") {
            "qualifying.html"
        } else {
            return ResultsTable::default();
        };
        parse_first_table(&read_fixture(fixture))
    }
}

fn utc(m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, m, d, h, min, 0).unwrap()
}

fn season() -> (AppConfig, ScheduleStore) {
    let config = AppConfig::new(SchedulerConfig::default(), GameConfig::default());
    let schedule =
        ScheduleStore::load(&fixture_path("race_schedule.json")).expect("schedule fixture loads");
    (config, schedule)
}

fn seeded_sheet(config: &AppConfig, cursor: i64) -> SqliteSheet {
    let sheet = SqliteSheet::open_in_memory().expect("in-memory sheet");
    let file = parse_predictions(&read_fixture("predictions.csv")).expect("predictions parse");
    seed_sheet(&sheet, config, &file).expect("seed sheet");
    sheet
        .write_cell(config.layout.cursor, CellValue::Int(cursor))
        .expect("write cursor");
    sheet
}

#[test]
fn raceweek_five_scores_the_whole_table() {
    let (config, schedule) = season();
    let sheet = seeded_sheet(&config, 4);
    let tally = WildcardTally::open_in_memory().expect("tally");
    let clock = FakeClock::at(utc(5, 4, 15, 0));
    let fetcher = FixtureFetcher::always_open(clock.clone());
    let orchestrator = Orchestrator::new(&config, &schedule, &sheet, &fetcher, &tally);

    let report = orchestrator
        .run_raceweek(5, clock.now())
        .expect("raceweek 5 runs");
    assert!(report.outcomes.iter().all(|(_, o)| *o == TaskOutcome::Updated));
    assert_eq!(report.cursor_after, 5);

    let board = &config.layout.scoreboard;
    // Tim: Verstappen predicted P1, standing P3.
    assert_eq!(sheet.read_cell(board.data_cell(0, 1)).unwrap(), CellValue::Int(2));
    // Tim: Red Bull predicted second team, standing third.
    assert_eq!(sheet.read_cell(board.data_cell(21, 1)).unwrap(), CellValue::Int(1));

    let totals = &config.layout.player_totals;
    assert_eq!(sheet.read_cell(totals[0]).unwrap(), CellValue::Int(8));
    assert_eq!(sheet.read_cell(totals[1]).unwrap(), CellValue::Int(7));

    let points = &config.layout.wildcard_points;
    let dnf_row = WildcardCategory::Dnfs.row_index() as u32;
    assert_eq!(sheet.read_cell(points.data_cell(dnf_row, 2)).unwrap(), CellValue::Int(1));
    assert_eq!(sheet.read_cell(points.data_cell(dnf_row, 4)).unwrap(), CellValue::Empty);

    let fastest = config.layout.wildcards.fastest_laps;
    assert_eq!(
        sheet.read_cell(fastest.data_cell(0, 0)).unwrap(),
        CellValue::text("Norris")
    );
    assert_eq!(sheet.read_cell(fastest.data_cell(0, 1)).unwrap(), CellValue::Int(3));

    let tracker = config.layout.points_tracker;
    assert_eq!(
        sheet
            .read_cell(CellCoords::new(tracker.header_row + 5, tracker.first_col))
            .unwrap(),
        CellValue::Int(8)
    );
    assert_eq!(
        sheet.read_cell(config.layout.last_updated).unwrap(),
        CellValue::text("2025-05-04")
    );

    let before = sheet.cells().unwrap();
    orchestrator.run_raceweek(5, clock.now()).expect("rerun");
    assert_eq!(before, sheet.cells().unwrap());
}

#[test]
fn scheduler_waits_for_window_then_polls_until_results_land() {
    let (config, schedule) = season();
    let sheet = seeded_sheet(&config, 4);
    let tally = WildcardTally::open_in_memory().expect("tally");
    let clock = FakeClock::at(utc(5, 4, 12, 0));
    let fetcher = FixtureFetcher {
        clock: clock.clone(),
        gated: "saudi-arabia",
        opens_at: utc(5, 4, 14, 20),
    };
    let orchestrator = Orchestrator::new(&config, &schedule, &sheet, &fetcher, &tally);
    let mut scheduler = Scheduler::new(&config.scheduler, &schedule, clock.clone(), &orchestrator);

    assert_eq!(scheduler.tick(), PassOutcome::WaitedForWindow(5));
    assert_eq!(clock.now(), utc(5, 4, 14, 0));

    assert_eq!(scheduler.tick(), PassOutcome::Updated(5));
    assert_eq!(clock.now(), utc(5, 4, 14, 20));
    assert_eq!(sheet.read_cell(config.layout.cursor).unwrap(), CellValue::Int(5));
}

#[test]
fn missed_raceweeks_are_caught_up_in_order() {
    let (config, schedule) = season();
    let sheet = seeded_sheet(&config, 2);
    let tally = WildcardTally::open_in_memory().expect("tally");
    let clock = FakeClock::at(utc(5, 1, 0, 0));
    let fetcher = FixtureFetcher::always_open(clock.clone());
    let orchestrator = Orchestrator::new(&config, &schedule, &sheet, &fetcher, &tally);
    let mut scheduler = Scheduler::new(&config.scheduler, &schedule, clock.clone(), &orchestrator);

    assert_eq!(scheduler.tick(), PassOutcome::CaughtUp { through: 4 });
    assert_eq!(sheet.read_cell(config.layout.cursor).unwrap(), CellValue::Int(4));
    let recorded = tally
        .recorded_raceweeks(WildcardCategory::Podiums)
        .unwrap()
        .into_iter()
        .collect::<Vec<_>>();
    assert_eq!(recorded, vec![1, 2, 3, 4]);
}

#[test]
fn unparseable_race_time_backs_off() {
    let (config, schedule) = season();
    let sheet = seeded_sheet(&config, 5);
    let tally = WildcardTally::open_in_memory().expect("tally");
    let clock = FakeClock::at(utc(5, 10, 0, 0));
    let fetcher = FixtureFetcher::always_open(clock.clone());
    let orchestrator = Orchestrator::new(&config, &schedule, &sheet, &fetcher, &tally);
    let mut scheduler = Scheduler::new(&config.scheduler, &schedule, clock.clone(), &orchestrator);

    assert_eq!(scheduler.tick(), PassOutcome::InvalidRaceTime(6));
    assert_eq!(clock.now(), utc(5, 10, 1, 0));
}

#[test]
fn standings_outage_leaves_cursor_alone() {
    let (config, schedule) = season();
    let sheet = seeded_sheet(&config, 4);
    let tally = WildcardTally::open_in_memory().expect("tally");
    let clock = FakeClock::at(utc(5, 4, 15, 0));
    let fetcher = FixtureFetcher {
        clock: clock.clone(),
        gated: "/team",
        opens_at: utc(12, 31, 0, 0),
    };
    let orchestrator = Orchestrator::new(&config, &schedule, &sheet, &fetcher, &tally);

    let report = orchestrator.run_raceweek(5, clock.now()).expect("run");
    assert!(matches!(
        report.outcome(UpdateTask::TeamStandings),
        Some(TaskOutcome::Unavailable(_))
    ));
    assert_eq!(report.outcome(UpdateTask::DriverStandings), Some(&TaskOutcome::Updated));
    assert!(!report.cursor_advanced());
    assert_eq!(sheet.read_cell(config.layout.cursor).unwrap(), CellValue::Int(4));
}
