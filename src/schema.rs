// src/schema.rs

use std::{fs, path::{Path, PathBuf}};

use anyhow::Error;
use schemars::schema_for;

use crate::flow::Flow;

pub const FLOW_SCHEMA_FILE: &str = "flow.schema.json";

/// Writes the JSON Schema of a persisted [`Flow`] record into `out_dir`.
pub fn write_schema(out_dir: &Path) -> Result<PathBuf, Error> {
    fs::create_dir_all(out_dir)?;

    let flow_schema = schema_for!(Flow);
    let flow_json = serde_json::to_string_pretty(&flow_schema)?;
    let path = out_dir.join(FLOW_SCHEMA_FILE);
    fs::write(&path, flow_json)?;
    tracing::info!("wrote flow schema to {}", path.display());

    Ok(path)
}
