use std::io::Write;

use anyhow::{Context, Result};

use crate::analysis::stability::HullSummary;

/// Writes the stability table as CSV. Unavailable values are left empty.
pub fn write_hull_report<W: Write>(rows: &[HullSummary], names: &[String], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "id",
        "name",
        "formula",
        "atoms",
        "value",
        "formation_per_atom",
        "distance_to_hull",
        "stable",
    ])
    .context("Failed to write report header")?;

    for row in rows {
        let name = names.get(row.id).map(String::as_str).unwrap_or("");
        wtr.write_record([
            row.id.to_string(),
            name.to_string(),
            row.formula.clone(),
            row.num_atoms.to_string(),
            format!("{:.9}", row.value),
            opt(row.formation_per_atom),
            opt(row.distance_to_hull),
            row.stable.map(|s| s.to_string()).unwrap_or_default(),
        ])
        .with_context(|| format!("Failed to write report row {}", row.id))?;
    }
    wtr.flush().context("Failed to flush report")?;
    Ok(())
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| format!("{:.9}", x)).unwrap_or_default()
}
