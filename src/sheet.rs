use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};

use crate::config::{CellCoords, TableCoords};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Int(i64),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Integer view of the cell; numeric text such as `"12"` or `"12.0"` counts.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CellValue::Int(v) => Some(*v),
            CellValue::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| f as i64)
                })
            }
            CellValue::Empty => None,
        }
    }

    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Int(v) => write!(f, "{v}"),
        }
    }
}

impl From<usize> for CellValue {
    fn from(value: usize) -> Self {
        CellValue::Int(value as i64)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

/// A header row plus data rows, with an optional leading index column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub index: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetTable {
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}

/// The spreadsheet the scoreboard lives on. Coordinates are 1-based.
pub trait Sheet {
    fn read_cell(&self, at: CellCoords) -> Result<CellValue>;

    fn write_cell(&self, at: CellCoords, value: CellValue) -> Result<()>;

    fn read_table(&self, coords: &TableCoords) -> Result<SheetTable> {
        let mut table = SheetTable::default();
        for c in 0..coords.width {
            let header = self.read_cell(CellCoords::new(coords.header_row, coords.first_col + c))?;
            table.headers.push(header.as_text());
        }
        for r in 0..coords.length {
            let mut row = Vec::with_capacity(coords.width as usize);
            for c in 0..coords.width {
                row.push(self.read_cell(coords.data_cell(r, c))?);
            }
            table.rows.push(row);
        }
        Ok(table)
    }

    /// Header row at `at`, data rows beneath it. With `include_index` the index
    /// column is written first and everything else shifts right by one.
    fn write_table(&self, at: CellCoords, table: &SheetTable, include_index: bool) -> Result<()> {
        let shift = u32::from(include_index);
        if include_index {
            self.write_cell(at, CellValue::Empty)?;
        }
        for (c, header) in table.headers.iter().enumerate() {
            self.write_cell(
                CellCoords::new(at.row, at.col + shift + c as u32),
                CellValue::text(header.as_str()),
            )?;
        }
        for (r, row) in table.rows.iter().enumerate() {
            let sheet_row = at.row + 1 + r as u32;
            if include_index {
                let label = table.index.get(r).cloned().unwrap_or_default();
                self.write_cell(CellCoords::new(sheet_row, at.col), CellValue::text(label))?;
            }
            for (c, value) in row.iter().enumerate() {
                self.write_cell(
                    CellCoords::new(sheet_row, at.col + shift + c as u32),
                    value.clone(),
                )?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySheet {
    cells: Mutex<BTreeMap<CellCoords, CellValue>>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeMap<CellCoords, CellValue> {
        self.cells
            .lock()
            .map(|cells| cells.clone())
            .unwrap_or_default()
    }
}

impl Sheet for MemorySheet {
    fn read_cell(&self, at: CellCoords) -> Result<CellValue> {
        let cells = self.cells.lock().map_err(|_| anyhow!("sheet lock poisoned"))?;
        Ok(cells.get(&at).cloned().unwrap_or_default())
    }

    fn write_cell(&self, at: CellCoords, value: CellValue) -> Result<()> {
        let mut cells = self.cells.lock().map_err(|_| anyhow!("sheet lock poisoned"))?;
        if value.is_empty() {
            cells.remove(&at);
        } else {
            cells.insert(at, value);
        }
        Ok(())
    }
}

/// Local stand-in for the hosted spreadsheet: one row per non-empty cell.
pub struct SqliteSheet {
    conn: Connection,
}

impl SqliteSheet {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open sheet db {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sheet")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cells (
                row INTEGER NOT NULL,
                col INTEGER NOT NULL,
                kind TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (row, col)
            );
            "#,
        )
        .context("create sheet schema")?;
        Ok(Self { conn })
    }

    pub fn cells(&self) -> Result<Vec<(CellCoords, CellValue)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT row, col, kind, value FROM cells ORDER BY row ASC, col ASC")
            .context("prepare cells query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    CellCoords::new(row.get::<_, u32>(0)?, row.get::<_, u32>(1)?),
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("query cells")?;
        let mut out = Vec::new();
        for row in rows {
            let (at, kind, raw) = row.context("decode cell row")?;
            out.push((at, decode_cell(&kind, raw)?));
        }
        Ok(out)
    }

    fn put(conn: &Connection, at: CellCoords, value: &CellValue) -> Result<()> {
        match value {
            CellValue::Empty => {
                conn.execute(
                    "DELETE FROM cells WHERE row = ?1 AND col = ?2",
                    params![at.row, at.col],
                )
                .with_context(|| format!("clear cell {}", at.a1()))?;
            }
            CellValue::Text(s) => {
                upsert_cell(conn, at, "text", s)?;
            }
            CellValue::Int(v) => {
                upsert_cell(conn, at, "int", &v.to_string())?;
            }
        }
        Ok(())
    }
}

impl Sheet for SqliteSheet {
    fn read_cell(&self, at: CellCoords) -> Result<CellValue> {
        let found = self
            .conn
            .query_row(
                "SELECT kind, value FROM cells WHERE row = ?1 AND col = ?2",
                params![at.row, at.col],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .with_context(|| format!("read cell {}", at.a1()))?;
        match found {
            Some((kind, raw)) => decode_cell(&kind, raw),
            None => Ok(CellValue::Empty),
        }
    }

    fn write_cell(&self, at: CellCoords, value: CellValue) -> Result<()> {
        Self::put(&self.conn, at, &value)
    }

    fn write_table(&self, at: CellCoords, table: &SheetTable, include_index: bool) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin table write")?;
        let shift = u32::from(include_index);
        if include_index {
            Self::put(&tx, at, &CellValue::Empty)?;
        }
        for (c, header) in table.headers.iter().enumerate() {
            Self::put(
                &tx,
                CellCoords::new(at.row, at.col + shift + c as u32),
                &CellValue::text(header.as_str()),
            )?;
        }
        for (r, row) in table.rows.iter().enumerate() {
            let sheet_row = at.row + 1 + r as u32;
            if include_index {
                let label = table.index.get(r).cloned().unwrap_or_default();
                Self::put(&tx, CellCoords::new(sheet_row, at.col), &CellValue::text(label))?;
            }
            for (c, value) in row.iter().enumerate() {
                Self::put(&tx, CellCoords::new(sheet_row, at.col + shift + c as u32), value)?;
            }
        }
        tx.commit().context("commit table write")?;
        Ok(())
    }
}

fn upsert_cell(conn: &Connection, at: CellCoords, kind: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO cells (row, col, kind, value) VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(row, col) DO UPDATE SET kind = excluded.kind, value = excluded.value
        "#,
        params![at.row, at.col, kind, value],
    )
    .with_context(|| format!("write cell {}", at.a1()))?;
    Ok(())
}

fn decode_cell(kind: &str, raw: String) -> Result<CellValue> {
    match kind {
        "int" => raw
            .parse::<i64>()
            .map(CellValue::Int)
            .with_context(|| format!("corrupt int cell {raw:?}")),
        "text" => Ok(CellValue::Text(raw)),
        other => Err(anyhow!("unknown cell kind {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> SheetTable {
        SheetTable {
            headers: vec!["Count".to_string(), "Rank".to_string()],
            index: vec!["Norris".to_string(), "Piastri".to_string()],
            rows: vec![
                vec![CellValue::Int(3), CellValue::Int(0)],
                vec![CellValue::Int(1), CellValue::Int(1)],
            ],
        }
    }

    #[test]
    fn sqlite_sheet_round_trips_tables_with_index() {
        let sheet = SqliteSheet::open_in_memory().unwrap();
        sheet
            .write_table(CellCoords::new(54, 5), &sample_table(), true)
            .unwrap();
        assert_eq!(sheet.read_cell(CellCoords::new(54, 6)).unwrap(), CellValue::text("Count"));
        assert_eq!(sheet.read_cell(CellCoords::new(55, 5)).unwrap(), CellValue::text("Norris"));
        assert_eq!(sheet.read_cell(CellCoords::new(56, 7)).unwrap(), CellValue::Int(1));

        let back = sheet
            .read_table(&TableCoords {
                header_row: 54,
                first_col: 6,
                width: 2,
                length: 2,
            })
            .unwrap();
        assert_eq!(back.headers, vec!["Count", "Rank"]);
        assert_eq!(back.rows, sample_table().rows);
    }

    #[test]
    fn writing_empty_clears_cell() {
        let sheet = SqliteSheet::open_in_memory().unwrap();
        let at = CellCoords::new(2, 2);
        sheet.write_cell(at, CellValue::Int(4)).unwrap();
        sheet.write_cell(at, CellValue::Empty).unwrap();
        assert_eq!(sheet.read_cell(at).unwrap(), CellValue::Empty);
        assert!(sheet.cells().unwrap().is_empty());
    }

    #[test]
    fn memory_and_sqlite_sheets_agree() {
        let memory = MemorySheet::new();
        let sqlite = SqliteSheet::open_in_memory().unwrap();
        memory.write_table(CellCoords::new(13, 12), &sample_table(), false).unwrap();
        sqlite.write_table(CellCoords::new(13, 12), &sample_table(), false).unwrap();
        let from_memory = memory.snapshot().into_iter().collect::<Vec<_>>();
        assert_eq!(from_memory, sqlite.cells().unwrap());
    }

    #[test]
    fn numeric_text_reads_as_int() {
        assert_eq!(CellValue::text("12").as_int(), Some(12));
        assert_eq!(CellValue::text("12.0").as_int(), Some(12));
        assert_eq!(CellValue::text("12.5").as_int(), None);
        assert_eq!(CellValue::Empty.as_int(), None);
    }

    #[test]
    fn table_cell_outside_rows_is_empty() {
        let table = sample_table();
        assert_eq!(table.cell(1, 0), &CellValue::Int(1));
        assert_eq!(table.cell(1, 5), &CellValue::Empty);
        assert_eq!(table.cell(9, 0), &CellValue::Empty);
    }
}
