//! Input table of lemmas to be queried

use crate::{Lemma, Result};
use anyhow::Context;
use csv_async::AsyncReaderBuilder;
use futures::stream::StreamExt;
use std::path::Path;
use tokio::fs::File;

/// Load the input lemmas, in file order
///
/// The input table is tab-separated, with a header row whose content is
/// ignored. Only the first column is used, and rows with an empty first cell
/// are skipped.
pub async fn load(path: &Path) -> Result<Vec<Lemma>> {
    let context = || format!("reading input lemmas from {}", path.display());
    let file = File::open(path).await.with_context(context)?;
    let mut rows = AsyncReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .create_reader(file)
        .into_records();

    let mut lemmas = Vec::new();
    while let Some(row) = rows.next().await {
        let row = row.with_context(context)?;
        match row.get(0).map(str::trim) {
            Some(lemma) if !lemma.is_empty() => lemmas.push(lemma.into()),
            _ => log::debug!("Skipping input row {:?} without a lemma", row.position()),
        }
    }
    log::info!("Loaded {} input lemma(s) from {}", lemmas.len(), path.display());
    Ok(lemmas)
}
