//! Weka ARFF export of the dataset.

use std::io::Write;

use crate::core::Result;
use crate::dataset::Dataset;

use super::csv::DATASET_HEADERS;

/// Write `dataset` as an ARFF relation named after `project`.
///
/// Release and Buggy are nominal, File is a string, all metrics are
/// numeric.
pub fn write<W: Write>(dataset: &Dataset, project: &str, writer: &mut W) -> Result<()> {
    writeln!(writer, "@relation {}", quote(project))?;
    writeln!(writer)?;

    let releases: Vec<String> = {
        let mut seen: Vec<usize> = dataset.records().iter().map(|r| r.release).collect();
        seen.dedup();
        seen.iter().map(usize::to_string).collect()
    };

    for header in DATASET_HEADERS {
        let kind = match header {
            "Release" => format!("{{{}}}", releases.join(",")),
            "File" => "string".to_string(),
            "Buggy" => "{yes,no}".to_string(),
            _ => "numeric".to_string(),
        };
        writeln!(writer, "@attribute {header} {kind}")?;
    }

    writeln!(writer)?;
    writeln!(writer, "@data")?;
    for r in dataset.records() {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{:.6},{}",
            r.release,
            quote(&r.path),
            r.size,
            r.loc_touched,
            r.loc_added,
            r.max_loc_added,
            r.loc_deleted,
            r.num_revisions,
            r.num_authors,
            r.churn,
            r.max_churn,
            r.chg_set_size,
            r.max_chg_set_size,
            r.num_fix,
            r.age,
            r.weighted_age,
            if r.buggy { "yes" } else { "no" },
        )?;
    }
    Ok(())
}

/// Single-quote a value, escaping embedded quotes and backslashes.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
