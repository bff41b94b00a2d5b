//! Free functions shared by the provider implementations.
//!
//! Providers compose these instead of inheriting from a common base: the
//! reconciliation state machine, the retry wrapper for store reads, the
//! common eligibility/hidden/filter rules and the concurrent scan.

use bridge_traits::FileRecord;
use core_runtime::logging::strip_path;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ProviderContext, ProviderCore, SelectionProvider};
use crate::card_set::CardSet;
use crate::error::{CardError, Result};
use crate::models::{FileChange, FilterOption, SelectionOptions};

// ============================================================================
// Reconciliation
// ============================================================================

/// Applies one file change to `current` using the provider's membership test.
///
/// ```text
/// Create(f):      included(f)            -> add
/// Modify(f):      present, included(f)   -> update
///                 present, !included(f)  -> remove
///                 absent,  included(f)   -> add
/// Delete(p):      present                -> remove
/// Rename(f, old): present(old)           -> remove old
///                 included(f)            -> add f
/// ```
///
/// Returns `None` when the card set is unchanged, including when `current`
/// belongs to another mode or a membership check failed.
pub async fn reconcile<P>(provider: &P, change: &FileChange, current: &CardSet) -> Option<CardSet>
where
    P: SelectionProvider + ?Sized,
{
    if current.mode() != provider.mode() {
        debug!(
            provider = %provider.mode(),
            card_set = %current.mode(),
            "Ignoring change for a card set of another mode"
        );
        return None;
    }

    let now = provider.core().ctx().now();

    let next = match change {
        FileChange::Create(file) => {
            if current.contains(&file.path) || !inclusion(provider, file).await? {
                return None;
            }
            current.add_file(file.clone(), now)
        }
        FileChange::Modify(file) => {
            let included = inclusion(provider, file).await?;
            match (current.contains(&file.path), included) {
                (true, true) => current.update_file(file.clone(), now),
                (true, false) => current.remove_file(&file.path, now),
                (false, true) => current.add_file(file.clone(), now),
                (false, false) => return None,
            }
        }
        FileChange::Delete { path } => current.remove_file(path, now),
        FileChange::Rename { file, old_path } => {
            let without_old = current.remove_file(old_path, now);
            if inclusion(provider, file).await? {
                without_old.add_file(file.clone(), now)
            } else {
                without_old
            }
        }
    };

    if next.shares_entries(current) {
        None
    } else {
        Some(next)
    }
}

async fn inclusion<P>(provider: &P, file: &FileRecord) -> Option<bool>
where
    P: SelectionProvider + ?Sized,
{
    match provider.evaluate_inclusion(file).await {
        Ok(included) => Some(included),
        Err(err) => {
            provider.report_failure("handle_file_change", &err);
            None
        }
    }
}

// ============================================================================
// Store Reads
// ============================================================================

/// Runs a store read, retrying [`CardError::ReadFailure`] with exponential
/// backoff (`initial_backoff_ms * 2^retry`) up to `read_retry_attempts`
/// attempts in total. Other errors return immediately.
pub async fn with_read_retry<T, F, Fut>(
    ctx: &ProviderContext,
    cancel: Option<&CancellationToken>,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = ctx.config.read_retry_attempts.max(1);
    let mut retry_count: u32 = 0;

    loop {
        if cancel.map_or(false, CancellationToken::is_cancelled) {
            return Err(CardError::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && retry_count + 1 < max_attempts => {
                let delay_ms = ctx
                    .config
                    .initial_backoff_ms
                    .saturating_mul(2u64.saturating_pow(retry_count));
                warn!(
                    operation,
                    attempt = retry_count + 1,
                    max_attempts,
                    delay_ms,
                    error = %err,
                    "Store read failed, retrying"
                );

                let delay = tokio::time::sleep(Duration::from_millis(delay_ms));
                match cancel {
                    Some(token) => {
                        tokio::select! {
                            _ = token.cancelled() => return Err(CardError::Cancelled),
                            _ = delay => {}
                        }
                    }
                    None => delay.await,
                }
                retry_count += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Eligible files of the store, with retry.
pub async fn list_candidates(
    ctx: &ProviderContext,
    cancel: &CancellationToken,
) -> Result<Vec<FileRecord>> {
    with_read_retry(ctx, Some(cancel), "list_files", || async {
        Ok(ctx.file_store.list_files(true).await?)
    })
    .await
}

// ============================================================================
// Common Rules
// ============================================================================

/// Eligible file type and, unless hidden files are wanted, not hidden.
pub fn passes_base_rules(
    ctx: &ProviderContext,
    options: &SelectionOptions,
    file: &FileRecord,
) -> bool {
    ctx.config.passes_base_rules(file, options.include_hidden)
}

/// Evaluates the configured filters, reading metadata only when a filter
/// needs it and the record does not carry it.
pub async fn passes_filters(
    ctx: &ProviderContext,
    options: &SelectionOptions,
    file: &FileRecord,
) -> Result<bool> {
    let filters = &options.filter_options;
    if filters.is_empty() {
        return Ok(true);
    }

    let needs_metadata =
        file.metadata.is_none() && filters.iter().any(FilterOption::needs_metadata);
    if !needs_metadata {
        return Ok(filters.iter().all(|filter| filter.matches(file)));
    }

    let metadata = with_read_retry(ctx, None, "read_metadata", || async {
        Ok(ctx.file_store.read_metadata(&file.path).await?)
    })
    .await?;
    let enriched = file.clone().with_metadata(metadata);
    Ok(filters.iter().all(|filter| filter.matches(&enriched)))
}

// ============================================================================
// Scans
// ============================================================================

/// Runs the provider's membership test over `candidates` with bounded
/// concurrency, keeping candidate order.
///
/// The token is checked between files. Files that vanished mid-scan
/// ([`CardError::NotFound`]) are skipped, and so are files still unreadable
/// after retries, which are reported. Cancellation and timeouts abort the
/// scan.
pub async fn collect_included<P>(
    provider: &P,
    candidates: Vec<FileRecord>,
    cancel: &CancellationToken,
) -> Result<Vec<FileRecord>>
where
    P: SelectionProvider + ?Sized,
{
    let limit = provider.core().ctx().config.max_concurrent_reads.max(1);
    let mut outcomes = stream::iter(candidates)
        .map(|file| async move {
            let outcome = provider.evaluate_inclusion(&file).await;
            (file, outcome)
        })
        .buffered(limit);

    let mut included = Vec::new();
    while let Some((file, outcome)) = outcomes.next().await {
        if cancel.is_cancelled() {
            return Err(CardError::Cancelled);
        }
        match outcome {
            Ok(true) => included.push(file),
            Ok(false) => {}
            Err(CardError::NotFound(_)) => {
                debug!(path = %strip_path(&file.path), "File disappeared during scan");
            }
            Err(err @ (CardError::Cancelled | CardError::ScanTimeout(_))) => return Err(err),
            Err(err) => {
                warn!(path = %strip_path(&file.path), error = %err, "Skipping unreadable file");
                provider.report_failure("evaluate_inclusion", &err);
            }
        }
    }
    Ok(included)
}

/// Card set from a load outcome; failures are reported and yield an empty
/// set tagged with the mode and source.
pub fn settle_load(
    core: &ProviderCore,
    source: Option<String>,
    outcome: Result<Vec<FileRecord>>,
) -> CardSet {
    match outcome {
        Ok(entries) => CardSet::new(core.mode(), source, entries, core.ctx().now()),
        Err(err) => {
            core.report("load_card_set", &err);
            core.empty_set(source)
        }
    }
}

/// Card set from a refresh outcome; failures keep `current`.
pub fn settle_refresh(
    core: &ProviderCore,
    current: &CardSet,
    source: Option<String>,
    outcome: Result<Vec<FileRecord>>,
) -> CardSet {
    match outcome {
        Ok(entries) => CardSet::new(core.mode(), source, entries, core.ctx().now()),
        Err(err) => {
            core.report("refresh_card_set", &err);
            current.clone()
        }
    }
}
