//! Progress reporting infrastructure

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::borrow::Cow;

/// Terminal progress bar over the lemmas of a run
///
/// When logs are printed to stderr, the bar stays hidden, since redrawing it
/// would garble log output. Progress is then only visible through the
/// periodic progress log lines.
#[derive(Clone, Debug)]
pub struct LemmaProgress(ProgressBar);
//
impl LemmaProgress {
    /// Prepare to report progress over `total` lemmas
    pub fn new(what: impl Into<Cow<'static, str>>, total: usize, visible: bool) -> Self {
        let bar = ProgressBar::with_draw_target(
            Some(total as u64),
            if visible {
                ProgressDrawTarget::stderr()
            } else {
                ProgressDrawTarget::hidden()
            },
        )
        .with_prefix(what)
        .with_style(
            ProgressStyle::with_template("{prefix} {wide_bar} {pos}/{len} (~{eta} left)")
                .expect("the style above should be a valid indicatif style"),
        );
        Self(bar)
    }

    /// Record that one more lemma was processed
    pub fn lemma_done(&self) {
        self.0.inc(1);
    }

    /// Position of the progress bar
    pub fn position(&self) -> u64 {
        self.0.position()
    }

    /// Hide the progress bar once the run is over
    pub fn finish(&self) {
        self.0.finish_and_clear();
    }
}
