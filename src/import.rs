//! Bulk import of parts and compatibility lists from CSV
//!
//! Each row after the header is positional:
//! `part_id, part_number, designed_for, part_name, compatible_models`
//! where `compatible_models` is a comma-separated list of model names.
//!
//! Rows are applied idempotently: parts are keyed by id, models by name, and
//! the designed-for model becomes the part's primary link unless the part
//! already has one. This is the only writer of primary links.
//!
//! [`clear_store`] empties a seed so it can be refilled from a fresh sheet.

use std::io::Read;
use std::path::Path;
use csv::ReaderBuilder;
use rusqlite::params;
use serde::Serialize;
use crate::model::{ModelId, PartId};
use crate::storage::{Executor, SqliteStore, StoreStats};
use crate::{Error, Result};

/// One parsed spreadsheet row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    /// 1-based line in the source, header included
    pub line: usize,
    pub part_id: PartId,
    pub part_number: String,
    pub designed_for: String,
    pub part_name: String,
    pub compatible: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub rows: usize,
    pub parts_added: usize,
    pub models_added: usize,
    pub primary_links: usize,
    pub secondary_links: usize,
}

impl std::fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rows: {} parts, {} models, {} primary / {} secondary links",
            self.rows, self.parts_added, self.models_added, self.primary_links, self.secondary_links
        )
    }
}

/// Parse rows from CSV text with a header line
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<ImportRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| Error::Import(format!("line {}: {}", line, e)))?;
        let field = |i: usize| record.get(i).unwrap_or_default().to_string();

        if record.iter().all(str::is_empty) {
            continue;
        }

        let raw_id = field(0);
        let part_id = raw_id
            .parse::<i64>()
            .map_err(|_| Error::Import(format!("line {}: invalid part id '{}'", line, raw_id)))?;

        let part_number = field(1);
        if part_number.is_empty() {
            return Err(Error::Import(format!("line {}: missing part number", line)));
        }

        let compatible = field(4)
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        rows.push(ImportRow {
            line,
            part_id: PartId(part_id),
            part_number,
            designed_for: field(2),
            part_name: field(3),
            compatible,
        });
    }
    Ok(rows)
}

/// Apply rows to a store in one transaction
pub fn import_rows(store: &mut SqliteStore, rows: &[ImportRow]) -> Result<ImportSummary> {
    let summary = store.transaction(|tx| {
        let mut summary = ImportSummary::default();
        for row in rows {
            apply_row(tx, row, &mut summary)?;
            summary.rows += 1;
        }
        Ok(summary)
    })?;

    tracing::info!("Imported {}", summary);
    Ok(summary)
}

/// Read a CSV file and apply it to a store
pub fn import_csv(store: &mut SqliteStore, path: &Path) -> Result<ImportSummary> {
    let file = std::fs::File::open(path)?;
    let rows = read_rows(std::io::BufReader::new(file))?;
    import_rows(store, &rows)
}

/// Empty every catalog table in one transaction, links first.
///
/// Returns the counts that were removed.
pub fn clear_store(store: &mut SqliteStore) -> Result<StoreStats> {
    let removed = store.stats()?;
    store.transaction(|tx| {
        tx.write("DELETE FROM car_part_models", &[])?;
        tx.write("DELETE FROM car_parts", &[])?;
        tx.write("DELETE FROM car_models", &[])?;
        Ok(())
    })?;

    tracing::info!(
        "Cleared {} models, {} parts and {} links",
        removed.models, removed.parts, removed.links
    );
    Ok(removed)
}

fn apply_row(tx: &Executor<'_>, row: &ImportRow, summary: &mut ImportSummary) -> Result<()> {
    summary.parts_added += tx.write(
        "INSERT OR IGNORE INTO car_parts (id, part_number, name) VALUES (?1, ?2, ?3)",
        params![row.part_id, row.part_number, row.part_name],
    )?;

    // The insert is also ignored when the number belongs to another id
    let owner = tx.query_rows(
        "SELECT id FROM car_parts WHERE part_number = ?1",
        params![row.part_number],
        |r| r.get::<_, PartId>(0),
    )?;
    if owner.first() != Some(&row.part_id) {
        return Err(Error::Import(format!(
            "line {}: part number {} conflicts with an existing part",
            row.line, row.part_number
        )));
    }

    if row.designed_for.is_empty() {
        tracing::warn!("Line {}: part {} has no designed-for model", row.line, row.part_number);
    } else {
        let model_id = ensure_model(tx, &row.designed_for, summary)?;
        let has_primary = tx.exists(
            "SELECT 1 FROM car_part_models WHERE part_id = ?1 AND is_primary = 1",
            params![row.part_id],
        )?;
        if has_primary {
            summary.secondary_links += link_secondary(tx, model_id, row.part_id)?;
        } else {
            tx.write(
                r#"
                INSERT INTO car_part_models (car_id, part_id, is_primary) VALUES (?1, ?2, 1)
                ON CONFLICT(car_id, part_id) DO UPDATE SET is_primary = 1
                "#,
                params![model_id, row.part_id],
            )?;
            summary.primary_links += 1;
        }
    }

    for name in &row.compatible {
        let model_id = ensure_model(tx, name, summary)?;
        summary.secondary_links += link_secondary(tx, model_id, row.part_id)?;
    }
    Ok(())
}

fn ensure_model(tx: &Executor<'_>, name: &str, summary: &mut ImportSummary) -> Result<ModelId> {
    summary.models_added += tx.write("INSERT OR IGNORE INTO car_models (name) VALUES (?1)", params![name])?;
    let ids = tx.query_rows(
        "SELECT id FROM car_models WHERE name = ?1",
        params![name],
        |r| r.get::<_, ModelId>(0),
    )?;
    ids.into_iter()
        .next()
        .ok_or_else(|| Error::Import(format!("model {} vanished during import", name)))
}

fn link_secondary(tx: &Executor<'_>, model_id: ModelId, part_id: PartId) -> Result<usize> {
    tx.write(
        "INSERT OR IGNORE INTO car_part_models (car_id, part_id, is_primary) VALUES (?1, ?2, 0)",
        params![model_id, part_id],
    )
}
