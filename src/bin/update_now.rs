use anyhow::{Context, Result, anyhow};
use chrono::Utc;

use f1_predictions::config::AppConfig;
use f1_predictions::orchestrator::{Orchestrator, TaskOutcome};
use f1_predictions::results_fetch::HttpResultsFetcher;
use f1_predictions::schedule::ScheduleStore;
use f1_predictions::sheet::SqliteSheet;
use f1_predictions::tally::WildcardTally;

fn main() -> Result<()> {
    f1_predictions::load_env();
    f1_predictions::init_tracing();

    let config = AppConfig::from_env()?;
    let schedule = ScheduleStore::load(&config.schedule_path)?;
    let sheet = SqliteSheet::open(&config.sheet_db_path)?;
    let tally = WildcardTally::open(&config.tally_db_path)?;
    if has_flag("--rebuild-tally") {
        tally.clear().context("clear wildcard tally")?;
        println!("Wildcard tally cleared; every raceweek will be fetched again");
    }

    let fetcher = HttpResultsFetcher::new();
    let orchestrator = Orchestrator::new(&config, &schedule, &sheet, &fetcher, &tally);

    let raceweek = match parse_raceweek_arg()? {
        Some(rw) => rw,
        None => {
            let cursor = orchestrator.current_raceweek()?;
            (cursor + 1).min(schedule.last_raceweek()).max(1)
        }
    };

    let report = orchestrator.run_raceweek(raceweek, Utc::now())?;
    println!("Raceweek {} update complete", report.raceweek);
    println!("Sheet: {}", config.sheet_db_path.display());
    for (task, outcome) in &report.outcomes {
        match outcome {
            TaskOutcome::Updated => println!("  {task}: updated"),
            TaskOutcome::Unavailable(reason) => println!("  {task}: unavailable ({reason})"),
            TaskOutcome::Failed(reason) => println!("  {task}: FAILED ({reason})"),
        }
    }
    println!(
        "Cursor: {} -> {}",
        report.cursor_before, report.cursor_after
    );
    Ok(())
}

fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == flag)
}

fn parse_raceweek_arg() -> Result<Option<u32>> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        let raw = if let Some(value) = arg.strip_prefix("--raceweek=") {
            value
        } else if arg == "--raceweek" {
            let Some(next) = args.get(idx + 1) else {
                return Err(anyhow!("--raceweek needs a value"));
            };
            next.as_str()
        } else {
            continue;
        };
        let raceweek = raw
            .trim()
            .parse::<u32>()
            .with_context(|| format!("invalid raceweek {raw:?}"))?;
        return Ok(Some(raceweek));
    }
    Ok(None)
}
