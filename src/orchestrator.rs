//! Runs the configured strategies in order over the fields still unresolved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{debug, info};

use crate::config::{ResolverOptions, ResolverStrategy};
use crate::error::{ConfigError, ResolveError};
use crate::logging::ORCHESTRATOR;
use crate::model::{BBoxResolveResult, ExtractedField};
use crate::pointer::PointerResolver;
use crate::resolver::{LegacyBBoxResolver, TokenFirstBBoxResolver};
use crate::search_index::DocumentIndex;

/// Cooperative cancellation flag shared between a caller and a running pass.
///
/// Workers check it before starting each field; fields not started by then
/// come back unresolved.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

pub struct ResolverOrchestrator {
    strategies: Vec<ResolverStrategy>,
    pointer: PointerResolver,
    token_first: TokenFirstBBoxResolver,
    legacy: LegacyBBoxResolver,
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for ResolverOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverOrchestrator")
            .field("strategies", &self.strategies)
            .field("threads", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .finish_non_exhaustive()
    }
}

impl ResolverOrchestrator {
    pub fn new(options: ResolverOptions) -> Result<Self, ConfigError> {
        options.validate()?;

        let pool = match options.max_degree_of_parallelism {
            0 => None,
            threads => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("fieldbox-resolver-{i}"))
                    .build()
                    .map_err(|e| ConfigError::ThreadPool(e.to_string()))?,
            ),
        };

        Ok(Self {
            strategies: options.strategy_order.strategies(),
            pointer: PointerResolver::new(&options)?,
            token_first: TokenFirstBBoxResolver::new(&options)?,
            legacy: LegacyBBoxResolver::new(&options)?,
            pool,
        })
    }

    pub fn resolve(
        &self,
        index: &DocumentIndex,
        fields: &[ExtractedField],
    ) -> Vec<BBoxResolveResult> {
        self.resolve_with_cancel(index, fields, &CancellationToken::new())
    }

    /// One result per input field, sorted by field name.
    ///
    /// A field leaves the remaining set as soon as one strategy resolves it.
    /// The legacy strategy handles every field it is given, so nothing runs
    /// after it.
    pub fn resolve_with_cancel(
        &self,
        index: &DocumentIndex,
        fields: &[ExtractedField],
        cancel: &CancellationToken,
    ) -> Vec<BBoxResolveResult> {
        let mut slots: Vec<Option<BBoxResolveResult>> = vec![None; fields.len()];
        let mut remaining: IndexSet<usize> = (0..fields.len()).collect();

        for &strategy in &self.strategies {
            if remaining.is_empty() || cancel.is_cancelled() {
                break;
            }
            let pending: Vec<usize> = remaining.iter().copied().collect();
            let batch: Vec<&ExtractedField> = pending.iter().map(|&i| &fields[i]).collect();
            let outcomes = self.run(strategy, index, &batch, cancel);

            let mut handled = 0usize;
            for (i, outcome) in pending.into_iter().zip(outcomes) {
                if let Some(result) = outcome {
                    slots[i] = Some(result);
                    remaining.shift_remove(&i);
                    handled += 1;
                }
            }
            debug!(
                target: ORCHESTRATOR,
                strategy = %strategy,
                attempted = batch.len(),
                handled,
                remaining = remaining.len(),
                "strategy finished"
            );
        }

        let mut results: Vec<BBoxResolveResult> = slots
            .into_iter()
            .zip(fields)
            .map(|(slot, field)| slot.unwrap_or_else(|| BBoxResolveResult::unresolved(field)))
            .collect();
        results.sort_by(|a, b| a.field_name.cmp(&b.field_name));

        info!(
            target: ORCHESTRATOR,
            fields = fields.len(),
            resolved = results.iter().filter(|r| r.is_resolved()).count(),
            cancelled = cancel.is_cancelled(),
            "resolution pass complete"
        );
        results
    }

    /// Runs a pass on tokio's blocking pool so async callers are not stalled
    /// by CPU-bound matching.
    pub async fn resolve_async(
        self: Arc<Self>,
        index: Arc<DocumentIndex>,
        fields: Vec<ExtractedField>,
        cancel: CancellationToken,
    ) -> Result<Vec<BBoxResolveResult>, ResolveError> {
        tokio::task::spawn_blocking(move || self.resolve_with_cancel(&index, &fields, &cancel))
            .await
            .map_err(|e| ResolveError::TaskFailed(e.to_string()))
    }

    fn run(
        &self,
        strategy: ResolverStrategy,
        index: &DocumentIndex,
        batch: &[&ExtractedField],
        cancel: &CancellationToken,
    ) -> Vec<Option<BBoxResolveResult>> {
        let dispatch = || match strategy {
            ResolverStrategy::Pointer => self.pointer.resolve(index, batch, cancel),
            ResolverStrategy::TokenFirst => self.token_first.resolve(index, batch, cancel),
            ResolverStrategy::Legacy => self.legacy.resolve(index, batch, cancel),
        };
        match &self.pool {
            Some(pool) => pool.install(dispatch),
            None => dispatch(),
        }
    }
}
