use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::changelog::ChangelogAssembler;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::git::{CommitSource, RevisionRange};
use crate::llm::{CommitBatcher, InferenceClient, LLMProvider};
use crate::models::{Batch, BatchFailure, ChangelogDocument, CommitRecord, ModelRequest, ModelResponse};
use crate::pipeline::output::{write_atomic, write_stream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Reading,
    Batching,
    Generating,
    Assembling,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub document: ChangelogDocument,
    pub rendered: String,
    pub commits_read: usize,
    pub batch_count: usize,
}

impl PipelineOutcome {
    pub fn failures(&self) -> &[BatchFailure] {
        &self.document.failed_batches
    }

    pub fn is_complete(&self) -> bool {
        self.document.failed_batches.is_empty()
    }
}

pub struct ChangelogPipeline {
    source: Arc<dyn CommitSource>,
    llm: Arc<dyn LLMProvider>,
    config: PipelineConfig,
    cancel: CancellationToken,
    state: PipelineState,
}

impl ChangelogPipeline {
    pub fn new(
        source: Arc<dyn CommitSource>,
        llm: Arc<dyn LLMProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            llm,
            config,
            cancel: CancellationToken::new(),
            state: PipelineState::Init,
        }
    }

    /// Shares an externally owned token, e.g. one tied to Ctrl-C.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Runs the whole pipeline and delivers the rendered changelog to the
    /// configured destination. Batch failures are reported through the
    /// outcome, not as an error.
    pub async fn run(&mut self) -> Result<PipelineOutcome> {
        match self.execute().await {
            Ok(outcome) => {
                self.transition(PipelineState::Done);
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!("Pipeline failed: {}", e);
                self.transition(PipelineState::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<PipelineOutcome> {
        self.config.validate()?;

        if !self.config.offline {
            self.config.check_context_limit(self.llm.max_context_tokens())?;
            if let Err(e) = self.llm.health_check().await {
                tracing::warn!(
                    "Ollama is not running. Start it with: ollama serve ({}: {})",
                    self.config.endpoint,
                    e
                );
            }
        }

        // Step 1: Read the commit range
        self.transition(PipelineState::Reading);
        let commits = self.read_commits().await?;
        self.ensure_not_cancelled()?;
        tracing::info!("Read {} commits", commits.len());

        self.transition(PipelineState::Batching);
        let assembler = ChangelogAssembler::new(self.config.release.clone());

        if commits.is_empty() {
            tracing::info!("No commits in range, nothing to summarize");
            self.transition(PipelineState::Assembling);
            let document = ChangelogDocument::empty(self.config.release.clone());
            return self.deliver(document, 0, 0);
        }

        if self.config.offline {
            tracing::info!("Offline mode, grouping commits by conventional-commit prefix");
            self.transition(PipelineState::Assembling);
            let document = assembler.assemble_from_commits(&commits);
            return self.deliver(document, commits.len(), 0);
        }

        // Step 2: Batch commits for the model context
        let commits_read = commits.len();
        let batches = CommitBatcher::new(self.config.max_batch_tokens).create_batches(commits);
        tracing::info!("Created {} batches for {}", batches.len(), self.llm.name());

        // Step 3: Generate entries through the worker pool
        self.transition(PipelineState::Generating);
        let responses = self.generate_all(&batches).await?;

        // Step 4: Assemble in batch order
        self.transition(PipelineState::Assembling);
        let truncated: Vec<usize> = batches.iter().filter(|b| b.truncated).map(|b| b.index).collect();
        let document = assembler.assemble(&responses, &truncated);
        self.deliver(document, commits_read, batches.len())
    }

    async fn read_commits(&self) -> Result<Vec<CommitRecord>> {
        let range = RevisionRange::new(self.config.from.clone(), self.config.to.clone())
            .with_order(self.config.order);
        tracing::info!("Reading commits in range {}", range);

        let source = self.source.clone();
        tokio::task::spawn_blocking(move || source.read_range(&range))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    /// Feeds every batch through a fixed number of workers and collects one
    /// terminal response per batch, sorted by batch index.
    async fn generate_all(&self, batches: &[Batch]) -> Result<Vec<ModelResponse>> {
        let client = InferenceClient::new(self.llm.clone(), self.config.retry.clone(), self.cancel.clone());
        let worker_count = self.config.concurrency_limit.clamp(1, batches.len().max(1));

        let requests: Vec<ModelRequest> = batches
            .iter()
            .map(|batch| {
                ModelRequest::from_batch(
                    batch,
                    &self.config.model,
                    self.config.temperature,
                    self.config.max_response_tokens,
                )
            })
            .collect();

        let (task_tx, task_rx) = mpsc::channel::<ModelRequest>(worker_count);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<ModelResponse>(batches.len().max(1));

        let mut workers = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            let client = client.clone();
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let cancel = self.cancel.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let next = task_rx.lock().await.recv().await;
                    let Some(request) = next else {
                        break;
                    };
                    if cancel.is_cancelled() {
                        break;
                    }
                    tracing::debug!("Worker {} took batch {}", worker, request.batch_index + 1);
                    let response = client.generate(&request).await;
                    if result_tx.send(response).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let cancel = self.cancel.clone();
        let feeder = tokio::spawn(async move {
            for request in requests {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = task_tx.send(request) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let pb = self.progress_bar(batches.len());
        let mut responses = Vec::with_capacity(batches.len());
        while let Some(response) = result_rx.recv().await {
            if let Some(failure) = response.failure_details() {
                tracing::debug!("{}", failure);
            }
            pb.inc(1);
            responses.push(response);
        }

        for joined in join_all(workers).await {
            if let Err(e) = joined {
                tracing::error!("Inference worker stopped unexpectedly: {}", e);
            }
        }
        if let Err(e) = feeder.await {
            tracing::error!("Batch feeder stopped unexpectedly: {}", e);
        }
        pb.finish_and_clear();

        self.ensure_not_cancelled()?;

        // A worker that died mid-batch leaves a hole; record it as a failure.
        let answered: HashSet<usize> = responses.iter().map(|r| r.batch_index).collect();
        for batch in batches.iter().filter(|b| !answered.contains(&b.index)) {
            responses.push(ModelResponse::failure(batch.index, 0, "no response from inference worker"));
        }

        responses.sort_by_key(|r| r.batch_index);
        tracing::info!(
            "Completed {} of {} batches",
            responses.iter().filter(|r| r.is_success()).count(),
            responses.len()
        );
        Ok(responses)
    }

    fn deliver(
        &self,
        document: ChangelogDocument,
        commits_read: usize,
        batch_count: usize,
    ) -> Result<PipelineOutcome> {
        self.ensure_not_cancelled()?;
        let rendered = self.config.format.renderer().render(&document);

        match &self.config.output {
            Some(path) => {
                write_atomic(path, &rendered)?;
                tracing::info!("Changelog written to: {}", path.display());
            }
            None => write_stream(&mut std::io::stdout().lock(), &rendered)?,
        }

        Ok(PipelineOutcome {
            document,
            rendered,
            commits_read,
            batch_count,
        })
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!("Pipeline state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::RetryPolicy;
    use crate::models::Category;
    use crate::testing::{commit, InMemoryCommitSource, Scripted, ScriptedProvider};
    use std::time::Duration;

    fn history() -> Vec<CommitRecord> {
        vec![
            commit(0, "feat: add login"),
            commit(1, "fix: resolve crash"),
            commit(2, "feat!: drop legacy config"),
            commit(3, "chore: bump deps"),
        ]
    }

    /// A budget small enough that every commit gets its own batch.
    fn one_commit_per_batch(mut commits: Vec<CommitRecord>) -> Vec<CommitRecord> {
        for c in &mut commits {
            c.body = "x".repeat(100);
        }
        commits
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::from(&Config::default());
        config.retry = RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries: 2,
            backoff_base: Duration::from_millis(100),
        };
        config
    }

    fn pipeline(
        commits: Vec<CommitRecord>,
        provider: Arc<ScriptedProvider>,
        config: PipelineConfig,
    ) -> ChangelogPipeline {
        ChangelogPipeline::new(Arc::new(InMemoryCommitSource::new(commits)), provider, config)
    }

    fn unavailable() -> Scripted {
        Scripted::Fail(Error::EndpointUnavailable("connection refused".to_string()))
    }

    #[tokio::test]
    async fn test_full_run_writes_ordered_changelog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG.md");
        let mut config = config();
        config.output = Some(path.clone());
        config.release = Some("v2.0.0".to_string());

        let provider = Arc::new(ScriptedProvider::new());
        let mut pipeline = pipeline(history(), provider.clone(), config);
        let outcome = pipeline.run().await.unwrap();

        assert_eq!(pipeline.state(), PipelineState::Done);
        assert!(outcome.is_complete());
        assert_eq!(outcome.commits_read, 4);
        assert_eq!(outcome.batch_count, 1);
        assert_eq!(provider.calls(), 1);

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, outcome.rendered);
        assert_eq!(
            written,
            "# Changelog v2.0.0\n\n## Breaking Changes\n\n- drop legacy config (abc0002)\n\n## Features\n\n- add login (abc0000)\n\n## Bug Fixes\n\n- resolve crash (abc0001)\n\n## Chores\n\n- bump deps (abc0003)\n"
        );
    }

    #[tokio::test]
    async fn test_empty_range_succeeds_without_model_calls() {
        let mut config = config();
        config.from = Some("abc0003".to_string());
        config.to = "abc0003".to_string();

        let provider = Arc::new(ScriptedProvider::new());
        let mut pipeline = pipeline(history(), provider.clone(), config);
        let outcome = pipeline.run().await.unwrap();

        assert!(outcome.document.is_empty());
        assert!(outcome.is_complete());
        assert_eq!(outcome.commits_read, 0);
        assert_eq!(provider.calls(), 0);
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_is_omitted_and_reported() {
        let commits = one_commit_per_batch(history()[..3].to_vec());
        let mut config = config();
        config.max_batch_tokens = 64;

        let provider = Arc::new(
            ScriptedProvider::new().script(1, vec![unavailable(), unavailable(), unavailable()]),
        );
        let mut pipeline = pipeline(commits, provider.clone(), config);
        let outcome = pipeline.run().await.unwrap();

        assert_eq!(outcome.batch_count, 3);
        assert_eq!(outcome.failures().len(), 1);
        assert_eq!(outcome.failures()[0].batch_index, 1);
        assert!(outcome.failures()[0].to_string().starts_with("batch 2 failed after 3 attempt(s)"));

        let sources: Vec<_> = outcome.document.entries().map(|e| e.position.0).collect();
        assert_eq!(sources, vec![2, 0]);
        assert!(!outcome.rendered.contains("resolve crash"));
        assert!(!outcome.rendered.contains("refused"));
        assert_eq!(provider.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_completion_order_does_not_change_output() {
        let commits = one_commit_per_batch(history());
        let mut sequential = config();
        sequential.max_batch_tokens = 64;
        let mut concurrent = sequential.clone();
        concurrent.concurrency_limit = 4;

        let slow_first = || {
            Arc::new(
                ScriptedProvider::new()
                    .script(0, vec![Scripted::Slow(Duration::from_secs(3), "feature: Login [abc0000]".into())])
                    .script(1, vec![Scripted::Slow(Duration::from_secs(2), "fix: Crash [abc0001]".into())]),
            )
        };

        let a = pipeline(commits.clone(), slow_first(), sequential).run().await.unwrap();
        let b = pipeline(commits, slow_first(), concurrent).run().await.unwrap();

        assert_eq!(a.rendered, b.rendered);
        let order: Vec<_> = b.document.sections.iter().map(|s| s.category).collect();
        assert_eq!(order, vec![Category::Breaking, Category::Feature, Category::Fix, Category::Chore]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_leaves_no_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG.md");
        let mut config = config();
        config.output = Some(path.clone());

        let provider = Arc::new(ScriptedProvider::new().script(0, vec![Scripted::Hang]));
        let cancel = CancellationToken::new();
        let mut pipeline = pipeline(history(), provider, config).with_cancellation(cancel.clone());

        let handle = tokio::spawn(async move {
            let result = pipeline.run().await;
            (result, pipeline.state())
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let (result, state) = handle.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(state, PipelineState::Failed);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_reading() {
        let mut config = config();
        config.concurrency_limit = 0;

        let provider = Arc::new(ScriptedProvider::new());
        let mut pipeline = pipeline(history(), provider.clone(), config);
        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_budget_over_model_context_is_rejected() {
        let mut config = config();
        config.max_batch_tokens = 500_000;

        let provider = Arc::new(ScriptedProvider::new().with_context_limit(8_192));
        let mut pipeline = pipeline(history(), provider.clone(), config);
        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(provider.calls(), 0);
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_revision_fails() {
        let mut config = config();
        config.from = Some("v9.9.9".to_string());

        let mut pipeline = pipeline(history(), Arc::new(ScriptedProvider::new()), config);
        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::RevisionNotFound(_)));
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[tokio::test]
    async fn test_offline_mode_skips_the_model() {
        let mut config = config();
        config.offline = true;

        let provider = Arc::new(ScriptedProvider::unhealthy());
        let mut pipeline = pipeline(history(), provider.clone(), config);
        let outcome = pipeline.run().await.unwrap();

        assert_eq!(provider.calls(), 0);
        assert_eq!(outcome.document.entry_count(), 4);
        assert!(outcome.rendered.contains("## Breaking Changes\n\n- drop legacy config (abc0002)"));
    }

    #[tokio::test]
    async fn test_unhealthy_endpoint_still_attempts_batches() {
        let provider = Arc::new(ScriptedProvider::unhealthy());
        let mut pipeline = pipeline(history(), provider.clone(), config());
        let outcome = pipeline.run().await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert!(outcome.is_complete());
    }
}
