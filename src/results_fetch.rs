use anyhow::Result;
use scraper::{ElementRef, Html, Selector};

use crate::http_cache::fetch_page_cached;
use crate::http_client::http_client;

/// The first table of a results page as plain text cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultsTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultsTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or_default())
                .collect(),
        )
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&str> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx).map(String::as_str)
    }

    pub fn without_columns(&self, drop: &[&str]) -> ResultsTable {
        let keep = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !drop.iter().any(|d| h.eq_ignore_ascii_case(d)))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        ResultsTable {
            headers: keep.iter().map(|&i| self.headers[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| {
                    keep.iter()
                        .map(|&i| row.get(i).cloned().unwrap_or_default())
                        .collect()
                })
                .collect(),
        }
    }
}

/// An empty table is the single "not ready / unavailable" signal: network
/// errors, timeouts and pages without a table all collapse into it.
pub trait ResultsFetcher: Sync {
    fn fetch_table(&self, url: &str) -> ResultsTable;
}

#[derive(Debug, Default)]
pub struct HttpResultsFetcher;

impl HttpResultsFetcher {
    pub fn new() -> Self {
        Self
    }

    fn try_fetch(&self, url: &str) -> Result<ResultsTable> {
        let client = http_client()?;
        let body = fetch_page_cached(client, url)?;
        Ok(parse_first_table(&body))
    }
}

impl ResultsFetcher for HttpResultsFetcher {
    fn fetch_table(&self, url: &str) -> ResultsTable {
        match self.try_fetch(url) {
            Ok(table) => {
                if table.is_empty() {
                    tracing::warn!("no table found at {url}");
                }
                table
            }
            Err(err) => {
                tracing::error!("error scraping {url}: {err:#}");
                ResultsTable::default()
            }
        }
    }
}

pub fn parse_first_table(html: &str) -> ResultsTable {
    let document = Html::parse_document(html);
    let Ok(table_sel) = Selector::parse("table") else {
        return ResultsTable::default();
    };
    let Some(table) = document.select(&table_sel).next() else {
        return ResultsTable::default();
    };
    let (Ok(tr_sel), Ok(th_sel), Ok(td_sel)) = (
        Selector::parse("tr"),
        Selector::parse("th"),
        Selector::parse("td"),
    ) else {
        return ResultsTable::default();
    };

    let mut headers = Vec::new();
    let mut rows = Vec::new();
    for tr in table.select(&tr_sel) {
        let cells = tr.select(&td_sel).map(cell_text).collect::<Vec<_>>();
        if cells.is_empty() {
            if headers.is_empty() {
                headers = tr.select(&th_sel).map(cell_text).collect();
            }
            continue;
        }
        rows.push(cells);
    }

    // Header-less tables get positional names so column lookups still work.
    if headers.is_empty() {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        headers = (0..width).map(|i| i.to_string()).collect();
    }
    ResultsTable { headers, rows }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
