use std::fs;
use std::mem::take;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::config::{AppConfig, CellCoords};
use crate::rank::WildcardCategory;
use crate::sheet::{CellValue, Sheet};

/// Largest numbered slot label accepted.
pub const MAX_SLOT_LABEL: usize = 200;

/// Player picks as laid out in a prediction file: a header row naming the
/// players, one row per slot, then optional wildcard rows labelled with the
/// category key (`poles`, `fastest_laps`, `podiums`, `dnfs`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictionFile {
    pub players: Vec<String>,
    pub slots: Vec<Vec<String>>,
    pub wildcards: Vec<(WildcardCategory, Vec<String>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub players: usize,
    pub slots: usize,
    pub wildcards: usize,
}

pub fn load_prediction_file(path: &Path) -> Result<PredictionFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read predictions {}", path.display()))?;
    parse_predictions(&raw)
}

/// Comma or tab separated. The first column labels the row: a 1-based slot
/// number, a wildcard key, or anything else for "the next slot".
pub fn parse_predictions(raw: &str) -> Result<PredictionFile> {
    let delimiter = if raw.lines().next().is_some_and(|l| l.contains('\t')) {
        '\t'
    } else {
        ','
    };
    let mut lines = raw
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'));
    let header = lines.next().ok_or_else(|| anyhow!("prediction file is empty"))?;
    let players = split_row(header, delimiter)
        .into_iter()
        .skip(1)
        .collect::<Vec<_>>();
    if players.is_empty() {
        return Err(anyhow!("prediction header names no players"));
    }

    let mut file = PredictionFile {
        players,
        ..PredictionFile::default()
    };
    for line in lines {
        let mut cells = split_row(line, delimiter);
        let label = if cells.is_empty() {
            String::new()
        } else {
            cells.remove(0)
        };
        cells.resize(file.players.len(), String::new());
        if let Some(category) = WildcardCategory::from_key(label.trim()) {
            file.wildcards.push((category, cells));
            continue;
        }
        let slot = match label.trim().parse::<usize>() {
            Ok(n) if n > MAX_SLOT_LABEL => {
                return Err(anyhow!("slot label {n} is above {MAX_SLOT_LABEL}"));
            }
            Ok(n) => n.checked_sub(1).unwrap_or(file.slots.len()),
            Err(_) => file.slots.len(),
        };
        if slot >= file.slots.len() {
            file.slots
                .resize(slot + 1, vec![String::new(); file.players.len()]);
        }
        file.slots[slot] = cells;
    }
    Ok(file)
}

/// Splits one line, keeping delimiters inside double quotes; `""` inside a
/// quoted cell is a literal quote.
fn split_row(line: &str, delimiter: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                cell.push('"');
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => cells.push(take(&mut cell).trim().to_string()),
            c => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

/// Write headers and picks into the scoreboard and wildcard points tables.
/// Score columns are left alone.
pub fn seed_sheet(sheet: &impl Sheet, config: &AppConfig, file: &PredictionFile) -> Result<SeedReport> {
    let layout = &config.layout;
    let slot_capacity = layout.scoreboard.length as usize;
    if file.slots.len() > slot_capacity {
        return Err(anyhow!(
            "{} prediction rows but the scoreboard holds {slot_capacity}",
            file.slots.len()
        ));
    }
    if file.players != config.game.players {
        tracing::warn!(
            "prediction file players {:?} differ from configured {:?}",
            file.players,
            config.game.players
        );
    }
    let players = file.players.len().min(config.game.players.len());

    for (p, player) in file.players.iter().take(players).enumerate() {
        let col = layout.scoreboard.first_col + p as u32 * 2;
        let header = layout.scoreboard.origin();
        sheet.write_cell(
            CellCoords::new(header.row, col),
            CellValue::text(player.as_str()),
        )?;
        sheet.write_cell(
            CellCoords::new(header.row, col + 1),
            CellValue::text(format!("{player} score")),
        )?;
        for (slot, picks) in file.slots.iter().enumerate() {
            let pick = picks.get(p).map(String::as_str).unwrap_or_default();
            sheet.write_cell(
                layout.scoreboard.data_cell(slot as u32, p as u32 * 2),
                CellValue::text(pick),
            )?;
        }
        for (category, picks) in &file.wildcards {
            let pick = picks.get(p).map(String::as_str).unwrap_or_default();
            sheet.write_cell(
                layout
                    .wildcard_points
                    .data_cell(category.row_index() as u32, 1 + p as u32 * 2),
                CellValue::text(pick),
            )?;
        }
    }
    Ok(SeedReport {
        players,
        slots: file.slots.len(),
        wildcards: file.wildcards.len(),
    })
}
