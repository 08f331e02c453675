//! Replay command implementation.

use lexisync_core::pager;
use lexisync_protocol::{Checkpoint, WireRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Fixture layout read by `replay`.
#[derive(Debug, Deserialize)]
pub struct RecordFixture {
    /// Records in any order.
    pub records: Vec<WireRecord>,
}

/// One page as printed by `replay`.
#[derive(Debug, Serialize)]
pub struct PageInfo {
    /// Zero-based page number.
    pub page: usize,
    /// Ids on the page, in order.
    pub ids: Vec<String>,
    /// Tombstoned ids on the page.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<String>,
    /// Checkpoint to present for the next page.
    pub checkpoint: Option<Checkpoint>,
}

/// Runs the replay command.
pub fn run(input: &Path, limit: usize, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let fixture: RecordFixture = serde_json::from_slice(&fs::read(input)?)?;
    info!(input = %input.display(), records = fixture.records.len(), limit, "replaying fixture");
    let pages = replay(fixture.records, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&pages)?);
        }
        _ => {
            print_text_output(&pages);
        }
    }

    Ok(())
}

/// Pages through `records` until an empty page comes back.
pub fn replay(
    records: Vec<WireRecord>,
    limit: usize,
) -> Result<Vec<PageInfo>, Box<dyn std::error::Error>> {
    if limit == 0 {
        return Err("limit must be positive".into());
    }
    let mut pages = Vec::new();
    let mut checkpoint: Option<Checkpoint> = None;
    loop {
        let page = pager::page(records.iter().cloned(), checkpoint.as_ref(), Some(limit))?;
        if page.is_empty() {
            break;
        }
        debug!(page = pages.len(), records = page.len(), "page cut");
        pages.push(PageInfo {
            page: pages.len(),
            ids: page.records.iter().map(|r| r.id.clone()).collect(),
            deleted: page
                .records
                .iter()
                .filter(|r| r.deleted)
                .map(|r| r.id.clone())
                .collect(),
            checkpoint: page.checkpoint.clone(),
        });
        checkpoint = page.checkpoint;
    }
    Ok(pages)
}

fn print_text_output(pages: &[PageInfo]) {
    if pages.is_empty() {
        println!("No records");
        return;
    }

    for info in pages {
        let checkpoint = info
            .checkpoint
            .as_ref()
            .map(|cp| format!("({}, {})", cp.id, cp.updated_at))
            .unwrap_or_else(|| "-".to_string());
        println!("page {:>4}  next {}", info.page, checkpoint);
        for id in &info.ids {
            let marker = if info.deleted.contains(id) { " (deleted)" } else { "" };
            println!("           {id}{marker}");
        }
    }

    let total: usize = pages.iter().map(|p| p.ids.len()).sum();
    println!();
    println!("{} records in {} pages", total, pages.len());
}
