use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;

use crate::core::domain::Structure;

/// Reads structures from a JSON file holding either one structure or an array of them.
pub fn load_structures(path: &Path) -> Result<Vec<Structure>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read structures from {}", path.display()))?;

    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let structures = match value {
        serde_json::Value::Array(_) => serde_json::from_value::<Vec<Structure>>(value),
        serde_json::Value::Object(_) => serde_json::from_value::<Structure>(value).map(|s| vec![s]),
        _ => bail!("Expected a structure or an array of structures in {}", path.display()),
    }
    .with_context(|| format!("Failed to parse structures in {}", path.display()))?;

    info!("Loaded {} structures from {}", structures.len(), path.display());
    Ok(structures)
}

/// Reads exactly one structure.
pub fn load_structure(path: &Path) -> Result<Structure> {
    let mut structures = load_structures(path)?;
    if structures.len() != 1 {
        bail!("Expected one structure in {}, found {}", path.display(), structures.len());
    }
    Ok(structures.remove(0))
}

pub fn save_structure(structure: &Structure, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(structure).context("Failed to serialise structure")?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
