use std::path::PathBuf;

use anyhow::{Result, anyhow};

use f1_predictions::config::AppConfig;
use f1_predictions::seed::{load_prediction_file, seed_sheet};
use f1_predictions::sheet::SqliteSheet;

fn main() -> Result<()> {
    f1_predictions::load_env();
    f1_predictions::init_tracing();

    let path = parse_file_arg().ok_or_else(|| anyhow!("usage: seed_predictions <predictions.csv>"))?;
    let config = AppConfig::from_env()?;
    let file = load_prediction_file(&path)?;
    let sheet = SqliteSheet::open(&config.sheet_db_path)?;
    let report = seed_sheet(&sheet, &config, &file)?;

    println!("Predictions seeded");
    println!("Sheet: {}", config.sheet_db_path.display());
    println!("Players: {}", report.players);
    println!("Slots: {}", report.slots);
    println!("Wildcard rows: {}", report.wildcards);
    Ok(())
}

fn parse_file_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--file=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--file" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    args.into_iter()
        .find(|arg| !arg.starts_with("--"))
        .map(PathBuf::from)
}
