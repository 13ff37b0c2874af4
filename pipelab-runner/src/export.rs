//! Export of evaluated pipelines: CSV frames and a Markdown summary.
//!
//! - **CSV**: one file per frame, a `date` column then one column per frame
//!   column; missing cells are left empty
//! - **Markdown**: node list with shapes, for a quick look at a run

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pipelab_core::{Frame, Value};

use crate::pipeline::EvaluatedPipeline;

// ─── CSV export ─────────────────────────────────────────────────────

/// Export a frame as CSV.
pub fn export_frame_csv(frame: &Frame) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let names = frame.column_names();
    let mut header = Vec::with_capacity(names.len() + 1);
    header.push("date");
    header.extend(names.iter().copied());
    wtr.write_record(&header)?;

    for (row, date) in frame.index().iter().enumerate() {
        let mut record = Vec::with_capacity(names.len() + 1);
        record.push(date.to_string());
        for name in &names {
            let cell = frame
                .column(name)
                .and_then(|column| column[row])
                .map(|x| x.to_string())
                .unwrap_or_default();
            record.push(cell);
        }
        wtr.write_record(&record)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Frames of a node value with their file stem: the node itself if it is a
/// frame, or `{node}_{key}` for each frame of a map.
fn frames_of<'a>(node: &str, value: &'a Value) -> Vec<(String, &'a Frame)> {
    match value {
        Value::Frame(frame) => vec![(node.to_string(), frame)],
        Value::Map(map) => map
            .iter()
            .filter_map(|(key, v)| v.as_frame().map(|f| (format!("{node}_{key}"), f)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Write every frame of an evaluated pipeline as CSV under `output_dir`.
///
/// Returns the written paths, sorted.
pub fn export_pipeline_csv(evaluated: &EvaluatedPipeline, output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create export dir: {}", output_dir.display()))?;

    let mut written = Vec::new();
    for (node, value) in evaluated.values() {
        for (stem, frame) in frames_of(node, value) {
            let path = output_dir.join(format!("{}.csv", sanitize(&stem)));
            let csv = export_frame_csv(frame)?;
            std::fs::write(&path, csv)
                .with_context(|| format!("failed to write {}", path.display()))?;
            written.push(path);
        }
    }
    written.sort();
    tracing::info!(files = written.len(), dir = %output_dir.display(), "exported frames");
    Ok(written)
}

fn sanitize(stem: &str) -> String {
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

// ─── Markdown summary ───────────────────────────────────────────────

/// Markdown table of the nodes of an evaluated pipeline.
pub fn generate_summary(evaluated: &EvaluatedPipeline) -> String {
    let mut md = String::with_capacity(512);

    md.push_str("# Pipeline Summary\n\n");
    md.push_str("| Node | Type | Shape |\n");
    md.push_str("| --- | --- | --- |\n");
    for (node, value) in evaluated.values() {
        md.push_str(&format!("| {node} | {} | {} |\n", value.type_name(), shape(value)));
    }
    md.push('\n');

    for (node, value) in evaluated.values() {
        if let Value::Map(map) = value {
            if frames_of(node, value).is_empty() {
                continue;
            }
            md.push_str(&format!("## {node}\n\n"));
            for key in map.keys() {
                md.push_str(&format!("- {key}: {}\n", shape(&map[key])));
            }
            md.push('\n');
        }
    }

    md
}

fn shape(value: &Value) -> String {
    match value {
        Value::Frame(frame) => {
            let (rows, cols) = frame.shape();
            let span = match (frame.first_date(), frame.last_date()) {
                (Some(first), Some(last)) => format!(", {first} to {last}"),
                _ => String::new(),
            };
            format!("{rows}x{cols}{span}")
        }
        Value::Map(map) => format!("{} entries", map.len()),
        Value::List(items) => format!("{} items", items.len()),
        _ => "-".to_string(),
    }
}
