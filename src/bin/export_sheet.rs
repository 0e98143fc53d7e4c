use std::path::PathBuf;

use anyhow::Result;

use f1_predictions::config::AppConfig;
use f1_predictions::sheet::SqliteSheet;
use f1_predictions::sheet_export::export_cells;

fn main() -> Result<()> {
    f1_predictions::load_env();
    f1_predictions::init_tracing();

    let config = AppConfig::from_env()?;
    let out = parse_out_arg().unwrap_or_else(|| PathBuf::from(format!("f1_predictions_{}.xlsx", config.game.year)));
    let sheet = SqliteSheet::open(&config.sheet_db_path)?;
    let cells = sheet.cells()?;
    let report = export_cells(&cells, &format!("Season {}", config.game.year), &out)?;

    println!("Export complete");
    println!("Workbook: {}", out.display());
    println!("Cells: {}", report.cells);
    println!("Extent: {} rows x {} cols", report.last_row, report.last_col);
    Ok(())
}

fn parse_out_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix("--out=") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == "--out" {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
