//! Dataset exports and terminal rendering.

pub mod arff;
pub mod csv;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::config::{ExportFormat, OutputConfig};
use crate::core::Result;
use crate::pipeline::BuildOutput;

/// Terminal output format.
#[derive(Clone, Copy, Debug, Default)]
pub enum Format {
    #[default]
    Json,
    Markdown,
    Text,
}

impl Format {
    pub fn format_value<W: Write>(&self, value: &Value, writer: &mut W) -> Result<()> {
        match self {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)?;
                writeln!(writer)?;
                Ok(())
            }
            Format::Markdown => write_markdown(value, writer, 1),
            Format::Text => write_text(value, writer, 0),
        }
    }

    pub fn format<T: Serialize, W: Write>(&self, data: &T, writer: &mut W) -> Result<()> {
        let value = serde_json::to_value(data)?;
        self.format_value(&value, writer)
    }
}

fn write_markdown<W: Write>(value: &Value, writer: &mut W, level: usize) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Object(_) | Value::Array(_) => {
                        writeln!(writer, "{} {}\n", "#".repeat(level.min(6)), title(key))?;
                        write_markdown(val, writer, level + 1)?;
                    }
                    _ => writeln!(writer, "- **{}**: {}", title(key), scalar(val))?,
                }
            }
            writeln!(writer)?;
        }
        Value::Array(items) if items.is_empty() => writeln!(writer, "_None_\n")?,
        Value::Array(items) => write_table(items, writer)?,
        _ => writeln!(writer, "{}\n", scalar(value))?,
    }
    Ok(())
}

/// Render an array of flat objects as a markdown table.
fn write_table<W: Write>(items: &[Value], writer: &mut W) -> Result<()> {
    let Some(Value::Object(first)) = items.first() else {
        for item in items {
            writeln!(writer, "- {}", scalar(item))?;
        }
        return Ok(writeln!(writer)?);
    };
    let headers: Vec<&String> = first.keys().collect();

    let cells: Vec<String> = headers.iter().map(|h| title(h)).collect();
    writeln!(writer, "| {} |", cells.join(" | "))?;
    writeln!(writer, "|{}", " --- |".repeat(headers.len()))?;
    for item in items {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| item.get(h.as_str()).map_or_else(|| "-".to_string(), scalar))
            .collect();
        writeln!(writer, "| {} |", cells.join(" | "))?;
    }
    writeln!(writer)?;
    Ok(())
}

fn write_text<W: Write>(value: &Value, writer: &mut W, indent: usize) -> Result<()> {
    let pad = "  ".repeat(indent);
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Object(_) | Value::Array(_) => {
                        writeln!(writer, "{pad}{}:", title(key))?;
                        write_text(val, writer, indent + 1)?;
                    }
                    _ => writeln!(writer, "{pad}{}: {}", title(key), scalar(val))?,
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(_) | Value::Array(_) => {
                        writeln!(writer, "{pad}-")?;
                        write_text(item, writer, indent + 1)?;
                    }
                    _ => writeln!(writer, "{pad}- {}", scalar(item))?,
                }
            }
        }
        _ => writeln!(writer, "{pad}{}", scalar(value))?,
    }
    Ok(())
}

/// `selected_releases` -> `Selected Releases`.
fn title(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => format!("{f:.4}"),
            _ => n.to_string(),
        },
        Value::Bool(b) => if *b { "yes" } else { "no" }.to_string(),
        Value::Null => "-".to_string(),
        _ => value.to_string(),
    }
}

/// Export file name for `project` and an artefact such as `Dataset`.
pub fn export_path(dir: &Path, project: &str, artefact: &str, extension: &str) -> PathBuf {
    dir.join(format!("{project}{artefact}.{extension}"))
}

/// Write every configured export of a finished build. Returns the paths
/// written.
pub fn write_exports(build: &BuildOutput, config: &OutputConfig) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&config.dir)?;
    let project = build.project.as_str();
    let mut written = Vec::new();

    for format in &config.formats {
        match format {
            ExportFormat::Csv => {
                let tables = [
                    ("Versions", csv::versions(&build.timeline)),
                    ("Tickets", csv::tickets(&build.estimate.issues, &build.history)),
                    ("Commits", csv::commits(&build.history)),
                    ("Dataset", csv::dataset(&build.dataset)),
                ];
                for (artefact, table) in tables {
                    let path = export_path(&config.dir, project, artefact, "csv");
                    let mut writer = BufWriter::new(File::create(&path)?);
                    table.write(&mut writer)?;
                    writer.flush()?;
                    written.push(path);
                }
            }
            ExportFormat::Arff => {
                let path = export_path(&config.dir, project, "Dataset", "arff");
                let mut writer = BufWriter::new(File::create(&path)?);
                arff::write(&build.dataset, project, &mut writer)?;
                writer.flush()?;
                written.push(path);
            }
            ExportFormat::Json => {
                let path = export_path(&config.dir, project, "Dataset", "json");
                let mut writer = BufWriter::new(File::create(&path)?);
                serde_json::to_writer_pretty(&mut writer, build.dataset.records())?;
                writer.flush()?;
                written.push(path);
            }
        }
    }

    tracing::info!(files = written.len(), dir = %config.dir.display(), "exports written");
    Ok(written)
}
