//! JSON and CSV export of fetch results

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backend::layout::OUTPUT_COLUMNS;
use crate::types::{FetchResult, OptionChainRow};

/// Files written by [`write_exports`]
#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

pub fn to_json_pretty(result: &FetchResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("Failed to serialize fetch result")
}

/// Chain as CSV with a header row
pub fn chain_to_csv(rows: &[OptionChainRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).context("Failed to write CSV row")?;
    }
    if rows.is_empty() {
        writer.write_record(OUTPUT_COLUMNS)?;
    }
    let bytes = writer.into_inner().context("Failed to flush CSV")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Write `option_data_{SYMBOL}_{HHMMSS}.json` and `option_chain_{SYMBOL}_{HHMMSS}.csv`
pub fn write_exports(dir: impl AsRef<Path>, result: &FetchResult) -> Result<ExportPaths> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;

    let stamp = result.timestamp.format("%H%M%S");
    let symbol = result.inputs.symbol.as_str();

    let json = dir.join(format!("option_data_{}_{}.json", symbol, stamp));
    fs::write(&json, to_json_pretty(result)?)
        .with_context(|| format!("Failed to write {}", json.display()))?;

    let csv = dir.join(format!("option_chain_{}_{}.csv", symbol, stamp));
    fs::write(&csv, chain_to_csv(&result.chain)?)
        .with_context(|| format!("Failed to write {}", csv.display()))?;

    info!("Exported {} rows to {}", result.chain.len(), dir.display());
    Ok(ExportPaths { json, csv })
}
