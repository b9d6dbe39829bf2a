//! Batch orchestration: select → cap → partition → dispatch → persist.
//!
//! Batches run strictly sequentially within one invocation, and batch N's
//! proposals are committed before batch N+1 is prompted. Failures are
//! contained at the batch level; only a missing or invalid provider
//! configuration aborts the whole run.

use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use uuid::Uuid;

use crate::error::AnnotationError;
use crate::parser::parse_annotations;
use crate::prompt::{build_annotation_prompt, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPLATE_BODY};
use crate::provider::{client_for, ChatClient, ChatMessage};
use crate::resolver::LabelResolver;
use crate::store::AnnotationStore;
use crate::types::{
    BatchOutcome, NewProposal, ProviderConfig, RunSummary, SelectionPolicy,
};

/// Default number of items per provider call.
pub const DEFAULT_BATCH_SIZE: usize = 3;
/// Hard ceiling on items per invocation; callers re-invoke for the rest.
pub const DEFAULT_MAX_ITEMS: usize = 20;
/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;
/// Pause between successive batch dispatches.
const BATCH_PAUSE: Duration = Duration::from_secs(2);

/// Bounded retry for transport-class failures, passed into dispatch rather
/// than kept as loop state so it can be tested on its own.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts (tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            retry_delay: Duration::ZERO,
        }
    }
}

/// Parameters of one orchestrator invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Source (uploaded file) whose items are targeted.
    pub source_id: i64,
    pub policy: SelectionPolicy,
    pub template_id: Option<i64>,
    /// Restrict the taxonomy offered to the model to these categories.
    pub categories: Option<Vec<String>>,
    pub batch_size: usize,
    pub max_items: usize,
    /// Overrides the configuration's max output tokens when set.
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl RunOptions {
    pub fn new(source_id: i64, policy: SelectionPolicy) -> Self {
        Self {
            source_id,
            policy,
            template_id: None,
            categories: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_items: DEFAULT_MAX_ITEMS,
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Drives annotation runs against a store and a chat backend.
pub struct BatchOrchestrator<'a> {
    store: &'a dyn AnnotationStore,
    retry: RetryPolicy,
    batch_pause: Duration,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(store: &'a dyn AnnotationStore) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            batch_pause: BATCH_PAUSE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// Resolve the active configuration, build its client, and run.
    ///
    /// The configuration is read once here and held for the whole run; a
    /// provider switch mid-run never affects an invocation in flight.
    pub fn run(&self, conn: &Connection, opts: &RunOptions) -> Result<RunSummary, AnnotationError> {
        let config = self
            .store
            .get_active_provider_config(conn)?
            .ok_or(AnnotationError::NoActiveConfig)?;
        let client = client_for(&config, opts.timeout_secs)?;
        self.run_with_client(conn, client.as_ref(), &config, opts)
    }

    /// Run with an explicit client (injected in tests).
    pub fn run_with_client(
        &self,
        conn: &Connection,
        client: &dyn ChatClient,
        config: &ProviderConfig,
        opts: &RunOptions,
    ) -> Result<RunSummary, AnnotationError> {
        let run_id = Uuid::new_v4().to_string();
        let mut summary = RunSummary::empty(run_id.clone(), opts.policy);

        let items = self
            .store
            .select_items(conn, opts.source_id, opts.policy)?;
        if items.is_empty() {
            summary.note = Some(format!("nothing to do for policy '{}'", opts.policy));
            tracing::info!(run_id = %run_id, policy = %opts.policy, "no eligible items");
            return Ok(summary);
        }

        let capped = &items[..items.len().min(opts.max_items.max(1))];
        if capped.len() < items.len() {
            summary.note = Some(format!(
                "capped at {} of {} eligible items",
                capped.len(),
                items.len()
            ));
        }

        let instructions = self
            .store
            .get_template(conn, opts.template_id)?
            .map(|t| t.body)
            .unwrap_or_else(|| DEFAULT_TEMPLATE_BODY.to_string());
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let user_id = self.store.get_or_create_system_user(conn)?;
        let batch_size = opts.batch_size.max(1);
        let max_tokens = opts.max_tokens.unwrap_or(config.max_tokens);

        tracing::info!(
            run_id = %run_id,
            policy = %opts.policy,
            provider = %config.provider,
            model = %config.model,
            items = capped.len(),
            batch_size,
            "starting annotation run"
        );

        for (batch_index, batch) in capped.chunks(batch_size).enumerate() {
            if batch_index > 0 && !self.batch_pause.is_zero() {
                thread::sleep(self.batch_pause);
            }

            let mut outcome = BatchOutcome {
                index: batch_index + 1,
                items: batch.len(),
                proposals: 0,
                error: None,
            };

            // Taxonomy is re-read per batch so label changes become visible
            // to the later batches of a long run.
            let labels = self
                .store
                .get_active_labels(conn, opts.categories.as_deref())?;
            if labels.is_empty() {
                if batch_index == 0 {
                    return Err(AnnotationError::NoActiveLabels);
                }
                outcome.error = Some("no active labels".to_string());
                summary.processed += batch.len() as u32;
                summary.batches.push(outcome);
                continue;
            }

            let texts: Vec<String> = batch.iter().map(|item| item.content.clone()).collect();
            let prompt = build_annotation_prompt(&texts, &labels, &instructions);
            let messages = [
                ChatMessage::system(system_prompt.clone()),
                ChatMessage::user(prompt),
            ];

            match self.dispatch(client, &config.model, &messages, config.temperature, max_tokens)
            {
                Err(e) => {
                    tracing::warn!(
                        run_id = %run_id,
                        batch = outcome.index,
                        error = %e,
                        "batch abandoned after retries"
                    );
                    outcome.error = Some(e.to_string());
                }
                Ok(content) if content.trim().is_empty() => {
                    // Empty is a valid reply, not a transport failure.
                    tracing::debug!(run_id = %run_id, batch = outcome.index, "empty reply");
                }
                Ok(content) => match parse_annotations(&content) {
                    Err(e) => {
                        tracing::warn!(
                            run_id = %run_id,
                            batch = outcome.index,
                            error = %e,
                            "unparseable reply, zero proposals"
                        );
                        outcome.error = Some(e.to_string());
                    }
                    Ok(parsed) => {
                        let resolver = LabelResolver::new(&labels);
                        let mut proposals = Vec::new();
                        for ann in parsed {
                            let Some(item) = batch.get(ann.index) else {
                                tracing::debug!(
                                    index = ann.index,
                                    batch_len = batch.len(),
                                    "index out of range, discarding"
                                );
                                continue;
                            };
                            let Some(label) = resolver.resolve(&ann.label) else {
                                continue;
                            };
                            proposals.push(NewProposal {
                                item_id: item.id,
                                label_id: label.id,
                                user_id,
                                confidence: ann.confidence,
                                model: config.model.clone(),
                                provider: config.provider,
                            });
                        }

                        let created = self.store.persist_proposals(
                            conn,
                            &proposals,
                            opts.policy == SelectionPolicy::Replace,
                        )?;
                        outcome.proposals = created;
                        summary.proposals_created += created;
                    }
                },
            }

            summary.processed += batch.len() as u32;
            tracing::info!(
                run_id = %run_id,
                batch = outcome.index,
                items = outcome.items,
                proposals = outcome.proposals,
                failed = outcome.error.is_some(),
                "batch finished"
            );
            summary.batches.push(outcome);
        }

        Ok(summary)
    }

    /// Build the first batch's prompt without dispatching anything, for
    /// operator inspection.
    pub fn preview_prompt(
        &self,
        conn: &Connection,
        opts: &RunOptions,
    ) -> Result<String, AnnotationError> {
        let labels = self
            .store
            .get_active_labels(conn, opts.categories.as_deref())?;
        if labels.is_empty() {
            return Err(AnnotationError::NoActiveLabels);
        }
        let instructions = self
            .store
            .get_template(conn, opts.template_id)?
            .map(|t| t.body)
            .unwrap_or_else(|| DEFAULT_TEMPLATE_BODY.to_string());

        let items = self
            .store
            .select_items(conn, opts.source_id, opts.policy)?;
        let first_batch = &items[..items.len().min(opts.batch_size.max(1))];
        let texts: Vec<String> = first_batch
            .iter()
            .map(|item| item.content.clone())
            .collect();
        Ok(build_annotation_prompt(&texts, &labels, &instructions))
    }

    /// One provider call under the retry policy. Only transport-class
    /// failures are retried; parse failures and valid-but-empty replies
    /// never re-dispatch the same prompt.
    fn dispatch(
        &self,
        client: &dyn ChatClient,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, AnnotationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match client.chat(model, messages, temperature, max_tokens) {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "provider call failed, retrying"
                    );
                    if !self.retry.retry_delay.is_zero() {
                        thread::sleep(self.retry.retry_delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
