use anyhow::{Context, Result};

use f1_predictions::config::AppConfig;
use f1_predictions::orchestrator::Orchestrator;
use f1_predictions::results_fetch::HttpResultsFetcher;
use f1_predictions::schedule::ScheduleStore;
use f1_predictions::scheduler::{Scheduler, SystemClock};
use f1_predictions::sheet::SqliteSheet;
use f1_predictions::tally::WildcardTally;

fn main() -> Result<()> {
    f1_predictions::load_env();
    f1_predictions::init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!("{}", config.describe());

    let schedule = ScheduleStore::load(&config.schedule_path)
        .context("race schedule is required to run the scheduler")?;
    tracing::info!(
        "loaded {} races from {}",
        schedule.races().len(),
        config.schedule_path.display()
    );

    let sheet = SqliteSheet::open(&config.sheet_db_path)?;
    let tally = WildcardTally::open(&config.tally_db_path)?;
    let fetcher = HttpResultsFetcher::new();
    let orchestrator = Orchestrator::new(&config, &schedule, &sheet, &fetcher, &tally);

    let mut scheduler = Scheduler::new(&config.scheduler, &schedule, SystemClock, &orchestrator);
    scheduler.run_forever()
}
