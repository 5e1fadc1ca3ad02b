//! Background status-polling sweep.
//!
//! Documents go SENT -> ACCEPTED/REJECTED asynchronously on the
//! authority's side; this sweep drives that edge. Each pass takes a
//! bounded batch of SENT documents, polls them sequentially with a pause
//! between calls, and isolates failures per document so one bad track
//! identifier never stalls the rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};
use tributo_shared::{DteResult, SweepConfig};

use crate::dte::service::DteService;
use crate::dte::types::AuthorityState;

/// Counters from one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// Documents polled this pass.
    pub polled: usize,
    /// Verdicts recorded as accepted.
    pub accepted: usize,
    /// Verdicts recorded as rejected.
    pub rejected: usize,
    /// Documents still in the authority's queue.
    pub still_processing: usize,
    /// Polls that failed; the documents stay SENT for the next pass.
    pub failed: usize,
}

/// Runs one bounded sweep pass.
///
/// # Errors
///
/// `DteError::Database` when the SENT batch cannot be listed.
/// Per-document poll failures are counted, not propagated.
#[instrument(skip(service, config))]
pub async fn sweep_once(service: &DteService, config: &SweepConfig) -> DteResult<SweepSummary> {
    let sent = service.pending_verdicts(config.batch_size).await?;
    let mut summary = SweepSummary {
        polled: sent.len(),
        ..SweepSummary::default()
    };

    for (index, document) in sent.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(Duration::from_millis(config.inter_call_delay_ms)).await;
        }

        match service.poll(document).await {
            Ok(AuthorityState::Accepted) => summary.accepted += 1,
            Ok(AuthorityState::Rejected) => summary.rejected += 1,
            Ok(AuthorityState::Processing) => summary.still_processing += 1,
            Err(err) => {
                warn!(
                    document_id = %document.document_id,
                    track_id = %document.track_id,
                    error = %err,
                    "Poll failed; document stays SENT"
                );
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Runs the sweep forever at the configured interval.
///
/// Pass failures are logged and the loop continues; this task only ends
/// when the process does.
pub async fn run(service: Arc<DteService>, config: SweepConfig) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match sweep_once(&service, &config).await {
            Ok(summary) => {
                if summary.polled > 0 {
                    info!(
                        polled = summary.polled,
                        accepted = summary.accepted,
                        rejected = summary.rejected,
                        still_processing = summary.still_processing,
                        failed = summary.failed,
                        "Sweep pass complete"
                    );
                }
            }
            Err(err) => error!(error = %err, "Sweep pass failed"),
        }
    }
}
