//! # Catalog Import
//!
//! Seeds the show catalog from a JSON file.
//!
//! ## Input
//! A JSON array of shows, same shape the admin routes accept:
//! `name`, `image`, `rating`, `description` and `playbackUrl` (or `url`).
//!
//! ## Matching
//! - Names are trimmed and inner whitespace collapsed before anything else
//! - A show whose name matches a stored one, ignoring case, overwrites it
//! - Anything else is created with a fresh id
//! - Entries that would fail admin validation are skipped and reported
//!
//! Running the same file twice creates nothing the second time.
use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use indicatif::ProgressBar;
use streamgate::{show::NewShow, store::ShowStore};

pub mod utils;

use utils::{full_patch, match_key, normalize_name};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

pub fn read_shows(path: &Path) -> anyhow::Result<Vec<NewShow>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of shows", path.display()))
}

pub async fn import_shows(
    store: &dyn ShowStore,
    shows: Vec<NewShow>,
    pb: &ProgressBar,
) -> anyhow::Result<ImportReport> {
    let mut known: HashMap<String, String> = store
        .list()
        .await
        .context("Failed to list stored shows")?
        .into_iter()
        .map(|show| (match_key(&show.name), show.id))
        .collect();

    let mut report = ImportReport::default();

    for mut show in shows {
        show.name = normalize_name(&show.name);
        pb.set_message(show.name.clone());

        if let Err(reason) = show.validate() {
            pb.println(format!("Skipping {:?}: {reason}", show.name));
            report.skipped += 1;
            pb.inc(1);
            continue;
        }

        let key = match_key(&show.name);
        match known.get(&key) {
            Some(id) => {
                store
                    .update(id, full_patch(show))
                    .await
                    .with_context(|| format!("Failed to update show {id}"))?;
                report.updated += 1;
            }
            None => {
                let created = store
                    .create(show)
                    .await
                    .with_context(|| format!("Failed to create show {key:?}"))?;
                known.insert(key, created.id);
                report.created += 1;
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("Done");
    Ok(report)
}
