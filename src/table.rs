//! Tab-separated output table of per-lemma statistics
//!
//! The output table doubles as the resume state of the program: on startup,
//! its previous content is loaded once into a [`PriorOutput`] snapshot, then
//! the file is rewritten from scratch through an [`OutputTable`] session,
//! which makes every record durable as soon as it is appended.

use crate::{config::CarryForward, Lemma, Result};
use anyhow::Context;
use csv_async::{AsyncReaderBuilder, AsyncWriter, AsyncWriterBuilder};
use futures::stream::StreamExt;
use serde::Deserialize;
use std::{collections::HashSet, fmt, io::ErrorKind, path::Path};
use tokio::fs::{self, File};

/// Column names of the output table
pub const HEADER: [&str; 3] = ["lemma", "docs", "occurrences"];

/// Statistics collected about one lemma
///
/// Counts are kept as the decimal strings found in the corpus response, with
/// digit group separators removed.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq)]
pub struct Record {
    /// Lemma that was queried
    pub lemma: Lemma,

    /// Number of documents where the lemma occurs, if known
    #[serde(default)]
    pub docs: Option<Box<str>>,

    /// Total number of occurences of the lemma, if known
    #[serde(default)]
    pub occurrences: Option<Box<str>>,
}
//
impl Record {
    /// Record for a lemma that the corpus had no statistics about
    pub fn no_data(lemma: Lemma) -> Self {
        Self {
            lemma,
            docs: None,
            occurrences: None,
        }
    }

    /// Truth that both statistics are known
    ///
    /// Incomplete records don't count as done and are queried again by the
    /// next run.
    pub fn is_complete(&self) -> bool {
        self.docs.is_some() && self.occurrences.is_some()
    }

    /// Table cells of this record, with absent statistics left empty
    fn cells(&self) -> [&str; 3] {
        [
            &*self.lemma,
            self.docs.as_deref().unwrap_or(""),
            self.occurrences.as_deref().unwrap_or(""),
        ]
    }
}
//
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.docs, &self.occurrences) {
            (Some(docs), Some(occurrences)) => write!(
                f,
                "{}: {docs} documents, {occurrences} occurrences",
                self.lemma
            ),
            _ => write!(f, "{}: no data", self.lemma),
        }
    }
}

/// Immutable snapshot of a previous run's output table
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PriorOutput {
    /// Records, in file order
    records: Vec<Record>,
}
//
impl PriorOutput {
    /// Load the output table of a previous run
    ///
    /// A missing or empty file just means that there was no previous run.
    /// Rows that cannot be decoded are skipped with a warning, which means
    /// their lemma will be queried again.
    pub async fn load(path: &Path) -> Result<Self> {
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No previous output at {}, starting fresh", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("opening previous output {}", path.display()))
            }
        };

        let mut rows = AsyncReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .create_deserializer(file)
            .into_deserialize::<Record>();
        let mut records = Vec::new();
        let mut row_idx = 0;
        while let Some(row) = rows.next().await {
            row_idx += 1;
            match row {
                Ok(record) if record.lemma.trim().is_empty() => {
                    log::warn!("Skipping previous output row {row_idx} without a lemma");
                }
                Ok(record) => records.push(record),
                Err(e) if matches!(e.kind(), csv_async::ErrorKind::Io(_)) => {
                    return Err(e)
                        .with_context(|| format!("reading previous output {}", path.display()))
                }
                Err(e) => {
                    log::warn!("Skipping unreadable previous output row {row_idx}: {e}");
                }
            }
        }

        let prior = Self { records };
        log::info!(
            "Loaded {} previous record(s) from {}, {} of which are complete",
            prior.records.len(),
            path.display(),
            prior.completed_lemmas().len()
        );
        Ok(prior)
    }

    /// Build a snapshot from records that are already in memory
    #[cfg(test)]
    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// All records, in file order
    #[cfg(test)]
    pub fn records(&self) -> &[Record] {
        &self.records[..]
    }

    /// Lemmas which already have complete statistics
    pub fn completed_lemmas(&self) -> HashSet<&str> {
        self.records
            .iter()
            .filter(|record| record.is_complete())
            .map(|record| &*record.lemma)
            .collect()
    }

    /// Records that should be copied into the new output table
    pub fn carried_forward(&self, policy: CarryForward) -> impl Iterator<Item = &Record> + '_ {
        self.records.iter().filter(move |record| match policy {
            CarryForward::All => true,
            CarryForward::CompleteOnly => record.is_complete(),
        })
    }
}

/// Output table being written by the current run
///
/// Every write is followed by a flush, so that the file on disk always holds
/// the header, the carried-forward records and every record appended so far.
/// Interrupting the process at any point thus leaves a table that the next
/// run can resume from.
pub struct OutputTable {
    /// Underlying TSV writer
    writer: AsyncWriter<File>,

    /// Number of records appended during this run
    appended: usize,
}
//
impl OutputTable {
    /// Create or truncate the output table, then write the header and the
    /// carried-forward records of a previous run
    pub async fn create<'prior>(
        path: &Path,
        carried: impl IntoIterator<Item = &'prior Record>,
    ) -> Result<Self> {
        let context = || format!("setting up output table {}", path.display());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.with_context(context)?;
        }
        let file = File::create(path).await.with_context(context)?;
        let mut writer = AsyncWriterBuilder::new()
            .delimiter(b'\t')
            .create_writer(file);

        writer.write_record(HEADER).await.with_context(context)?;
        let mut num_carried = 0;
        for record in carried {
            writer.write_record(record.cells()).await.with_context(context)?;
            num_carried += 1;
        }
        writer.flush().await.with_context(context)?;
        log::debug!(
            "Output table {} holds {num_carried} carried-forward record(s)",
            path.display()
        );

        Ok(Self {
            writer,
            appended: 0,
        })
    }

    /// Append a record and make sure it reaches the file
    pub async fn append(&mut self, record: &Record) -> Result<()> {
        self.writer
            .write_record(record.cells())
            .await
            .with_context(|| format!("writing the record of {:?}", record.lemma))?;
        self.writer
            .flush()
            .await
            .with_context(|| format!("flushing the record of {:?}", record.lemma))?;
        self.appended += 1;
        Ok(())
    }

    /// Close the table, telling how many records were appended
    pub async fn finish(mut self) -> Result<usize> {
        self.writer.flush().await.context("flushing the output table")?;
        let file = self
            .writer
            .into_inner()
            .await
            .map_err(|e| anyhow::format_err!("closing the output table: {e}"))?;
        file.sync_all().await.context("syncing the output table to disk")?;
        Ok(self.appended)
    }
}
