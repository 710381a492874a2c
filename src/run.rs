//! Top-level query loop

use crate::{
    config::Config,
    extract::StatsExtractor,
    fetch::{FetchError, Fetcher},
    lemmas,
    plan::WorkSet,
    progress::LemmaProgress,
    table::{OutputTable, PriorOutput, Record},
    Result,
};
use anyhow::Context;
use std::sync::Arc;
use tokio::time::sleep;

/// Number of lemmas between two progress log lines
const PROGRESS_LOG_PERIOD: usize = 1000;

/// What happened during a run
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    /// Lemmas that were queried
    pub attempted: usize,

    /// Lemmas for which complete statistics were recorded
    pub complete: usize,

    /// Lemmas recorded without statistics, to be retried by the next run
    pub no_data: usize,

    /// Lemmas that were recorded without statistics because the corpus
    /// could not be reached
    pub unreachable: usize,

    /// Lemmas for which nothing could be recorded
    pub failed: usize,
}

/// Fate of a single lemma
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Outcome {
    Complete,
    NoData,
    Unreachable,
}

/// Query every lemma of the input table which doesn't have complete
/// statistics in the output table yet
///
/// Per-lemma problems are logged and do not stop the run. Only failures to
/// read the input table or to set up the output table are fatal.
pub async fn run(config: Arc<Config>, client: reqwest::Client) -> Result<RunSummary> {
    // Work out what remains to be done from a snapshot of the previous output
    let input = lemmas::load(&config.input_path).await?;
    let prior = PriorOutput::load(&config.output_path).await?;
    let work = WorkSet::plan(&input, &prior);
    if work.is_empty() {
        log::info!("Every input lemma already has statistics, nothing to query");
    }

    // Prepare the query pipeline
    let fetcher = Fetcher::new(config.clone(), client);
    let extractor = StatsExtractor::new().context("setting up the statistics extractor")?;
    let mut table = OutputTable::create(
        &config.output_path,
        prior.carried_forward(config.carry_forward),
    )
    .await?;
    let progress = LemmaProgress::new("Querying the corpus", work.len(), config.show_progress);

    // Query lemmas one by one, recording results as they come
    let mut summary = RunSummary::default();
    for (idx, lemma) in work.lemmas().iter().enumerate() {
        sleep(config.request_delay).await;
        summary.attempted += 1;
        match process_lemma(&fetcher, &extractor, &mut table, lemma).await {
            Ok(Outcome::Complete) => summary.complete += 1,
            Ok(Outcome::NoData) => summary.no_data += 1,
            Ok(Outcome::Unreachable) => summary.unreachable += 1,
            Err(e) => {
                log::error!("Error while processing {lemma:?}: {e:#}");
                summary.failed += 1;
            }
        }
        progress.lemma_done();
        if idx % PROGRESS_LOG_PERIOD == 0 {
            log::info!("{idx}/{} lemmas parsed.", work.len());
        }
    }
    progress.finish();

    // Close the output table
    let appended = table.finish().await?;
    log::info!(
        "Processed {} lemma(s) and appended {appended} record(s) to {}: {} complete, {} without data, {} unreachable, {} failed",
        progress.position(),
        config.output_path.display(),
        summary.complete,
        summary.no_data,
        summary.unreachable,
        summary.failed
    );
    Ok(summary)
}

/// Query, extract and record the statistics of one lemma
async fn process_lemma(
    fetcher: &Fetcher,
    extractor: &StatsExtractor,
    table: &mut OutputTable,
    lemma: &str,
) -> Result<Outcome> {
    let (record, outcome) = match fetcher.fetch(lemma).await {
        Ok(body) => {
            let record = extractor.extract(lemma, &body)?;
            let outcome = if record.is_complete() {
                Outcome::Complete
            } else {
                Outcome::NoData
            };
            (record, outcome)
        }
        Err(e @ FetchError::Exhausted { .. }) => {
            log::error!("{:#}", anyhow::Error::from(e));
            (Record::no_data(lemma.into()), Outcome::Unreachable)
        }
        Err(e) => return Err(e.into()),
    };
    table.append(&record).await?;
    log::info!("{record}");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{tests::test_config, CarryForward};
    use std::path::Path;
    use wiremock::{
        matchers::{method, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    const HEADER_ROW: &str = "lemma\tdocs\toccurrences\n";

    fn stats_page(docs: &str, occurrences: &str) -> String {
        format!(
            r#"<html><body><div class="content"><p class="found">
                Documents: <span class="stat-number">85 996</span>,
                occurrences: <span class="stat-number">337 110 421</span>.
                Matches: <span class="stat-number">{docs}</span> documents,
                <span class="stat-number">{occurrences}</span> occurrences.
            </p></div></body></html>"#
        )
    }

    const NOT_FOUND_PAGE: &str = r#"<html><body><div class="content">
        <p class="error">No results.</p>
    </div></body></html>"#;

    async fn serve(server: &MockServer, lemma: &str, body: String, times: u64) {
        Mock::given(method("GET"))
            .and(query_param("lex1", lemma))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(times)
            .mount(server)
            .await;
    }

    fn config(dir: &Path, server: &MockServer, input: &str) -> Arc<Config> {
        let config = test_config(dir, &format!("{}/search.xml?lex1={{lemma}}", server.uri()));
        std::fs::write(&config.input_path, input).unwrap();
        Arc::new(config)
    }

    fn output(config: &Config) -> String {
        std::fs::read_to_string(&config.output_path).unwrap()
    }

    #[tokio::test]
    async fn fresh_run() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        serve(&server, "bread", stats_page("100", "500"), 1).await;
        serve(&server, "stone", NOT_FOUND_PAGE.into(), 1).await;
        let config = config(dir.path(), &server, "lemma\nbread\nstone\n");

        let summary = run(config.clone(), reqwest::Client::new()).await.unwrap();
        assert_eq!(
            summary,
            RunSummary {
                attempted: 2,
                complete: 1,
                no_data: 1,
                ..RunSummary::default()
            }
        );
        assert_eq!(
            output(&config),
            format!("{HEADER_ROW}bread\t100\t500\nstone\t\t\n")
        );
    }

    #[tokio::test]
    async fn resumed_run_skips_complete_lemmas() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        serve(&server, "bread", stats_page("100", "500"), 0).await;
        serve(&server, "stone", stats_page("7", "9"), 1).await;
        serve(&server, "water", NOT_FOUND_PAGE.into(), 1).await;
        let config = config(dir.path(), &server, "lemma\nbread\nstone\nwater\n");
        std::fs::write(
            &config.output_path,
            format!("{HEADER_ROW}bread\t100\t500\nstone\t\t\n"),
        )
        .unwrap();

        let summary = run(config.clone(), reqwest::Client::new()).await.unwrap();
        assert_eq!(summary.attempted, 2);
        assert_eq!(
            output(&config),
            format!("{HEADER_ROW}bread\t100\t500\nstone\t\t\nstone\t7\t9\nwater\t\t\n")
        );
    }

    #[tokio::test]
    async fn stale_records_can_be_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        serve(&server, "stone", stats_page("7", "9"), 1).await;
        let mut config = (*config(dir.path(), &server, "lemma\nbread\nstone\n")).clone();
        config.carry_forward = CarryForward::CompleteOnly;
        std::fs::write(
            &config.output_path,
            format!("{HEADER_ROW}bread\t100\t500\nstone\t\t\n"),
        )
        .unwrap();

        run(Arc::new(config.clone()), reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(
            output(&config),
            format!("{HEADER_ROW}bread\t100\t500\nstone\t7\t9\n")
        );
    }

    #[tokio::test]
    async fn finished_run_has_nothing_left_to_do() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        serve(&server, "bread", stats_page("100", "500"), 1).await;
        let config = config(dir.path(), &server, "lemma\nbread\n");

        run(config.clone(), reqwest::Client::new()).await.unwrap();
        let summary = run(config.clone(), reqwest::Client::new()).await.unwrap();
        assert_eq!(summary, RunSummary::default());
        assert_eq!(output(&config), format!("{HEADER_ROW}bread\t100\t500\n"));
    }

    #[tokio::test]
    async fn interrupted_run_resumes_from_durable_records() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let config = config(dir.path(), &server, "lemma\nbread\nstone\nwater\nsalt\n");

        // Simulate a run that gets killed after two lemmas
        {
            let input = lemmas::load(&config.input_path).await.unwrap();
            let prior = PriorOutput::load(&config.output_path).await.unwrap();
            let work = WorkSet::plan(&input, &prior);
            let mut table = OutputTable::create(&config.output_path, prior.records())
                .await
                .unwrap();
            let first = Record {
                lemma: work.lemmas()[0].clone(),
                docs: Some("1".into()),
                occurrences: Some("2".into()),
            };
            table.append(&first).await.unwrap();
            table
                .append(&Record::no_data(work.lemmas()[1].clone()))
                .await
                .unwrap();
            std::mem::forget(table);
        }

        let input = lemmas::load(&config.input_path).await.unwrap();
        let prior = PriorOutput::load(&config.output_path).await.unwrap();
        let work = WorkSet::plan(&input, &prior);
        let pending = work.lemmas().iter().map(|l| &**l).collect::<Vec<_>>();
        assert_eq!(pending, ["stone", "water", "salt"]);
    }

    #[tokio::test]
    async fn lemma_failures_do_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let truncated = r#"<div class="content"><p class="found">
            <span class="stat-number">1</span><span class="stat-number">2</span>
        </p></div>"#;
        serve(&server, "bread", truncated.into(), 1).await;
        serve(&server, "stone", stats_page("7", "9"), 1).await;
        let config = config(dir.path(), &server, "lemma\nbread\nstone\n");

        let summary = run(config.clone(), reqwest::Client::new()).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.complete, 1);
        assert_eq!(output(&config), format!("{HEADER_ROW}stone\t7\t9\n"));
    }

    #[tokio::test]
    async fn unreachable_corpus_records_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = test_config(
            dir.path(),
            &format!("http://127.0.0.1:{port}/search.xml?lex1={{lemma}}"),
        );
        std::fs::write(&config.input_path, "lemma\nbread\n").unwrap();
        let config = Arc::new(config);

        let summary = run(config.clone(), reqwest::Client::new()).await.unwrap();
        assert_eq!(summary.unreachable, 1);
        assert_eq!(output(&config), format!("{HEADER_ROW}bread\t\t\n"));
    }

    #[tokio::test]
    async fn unwritable_output_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let mut config = (*config(dir.path(), &server, "lemma\nbread\n")).clone();
        config.output_path = dir.path().to_owned();
        assert!(run(Arc::new(config), reqwest::Client::new()).await.is_err());
    }

    #[tokio::test]
    async fn missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        let config = config(dir.path(), &server, "lemma\nbread\n");
        std::fs::remove_file(&config.input_path).unwrap();
        assert!(run(config, reqwest::Client::new()).await.is_err());
    }
}
