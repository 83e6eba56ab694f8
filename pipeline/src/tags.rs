//! Tag catalog loading and random selection.
//!
//! A run mixes a handful of Steam-style tags into one game concept. The
//! catalog ships embedded in the binary; a config override can point at a
//! different JSON file with the same shape.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rand::Rng;
use serde::{Deserialize, Serialize};

const EMBEDDED_CATALOG: &str = include_str!("../data/steam_tags.json");

/// One entry in the tag catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Catalog {
    tags: Vec<Tag>,
}

/// The tags chosen for a run, in selection order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSelection {
    pub count: usize,
    pub tags: Vec<Tag>,
}

impl TagSelection {
    /// Tag names in selection order.
    pub fn names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }

    /// Wrap externally supplied tag names, assigning synthetic ids.
    pub fn from_names(names: &[String]) -> Self {
        let tags: Vec<Tag> = names
            .iter()
            .enumerate()
            .map(|(i, name)| Tag {
                id: i as u32,
                name: name.clone(),
            })
            .collect();
        Self {
            count: tags.len(),
            tags,
        }
    }
}

/// Load the tag catalog, preferring `override_path` when given.
pub fn load_catalog(override_path: Option<&Path>) -> Result<Vec<Tag>> {
    let raw = match override_path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read tag catalog {}", path.display()))?
        }
        None => EMBEDDED_CATALOG.to_string(),
    };
    let catalog: Catalog = serde_json::from_str(&raw).context("parse tag catalog")?;
    if catalog.tags.is_empty() {
        return Err(anyhow!("tag catalog is empty"));
    }
    Ok(catalog.tags)
}

/// Select a uniformly random count in `[min, max]` of distinct tags.
///
/// Sampling is without replacement (partial Fisher-Yates). The count is
/// clamped to the catalog size.
pub fn select_tags(catalog: &[Tag], min: u32, max: u32) -> Result<TagSelection> {
    if min == 0 || min > max {
        return Err(anyhow!("invalid tag bounds: min={min}, max={max}"));
    }
    let mut rng = rand::thread_rng();
    let count = rng.gen_range(min..=max) as usize;
    let count = count.min(catalog.len());

    let mut pool: Vec<Tag> = catalog.to_vec();
    let mut selected = Vec::with_capacity(count);
    for _ in 0..count {
        let idx = rng.gen_range(0..pool.len());
        selected.push(pool.swap_remove(idx));
    }

    Ok(TagSelection {
        count: selected.len(),
        tags: selected,
    })
}
