//! Concurrent pipelines over disjoint key ranges.
//!
//! Each shard runs its own strictly sequential scan-classify-delete loop
//! with its own cursor. Shards share only the run counters (atomic) and the
//! delete throttle, so the run's total delete rate stays bounded no matter
//! how many shards there are. The first shard failure stops the others
//! between rows.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info_span, warn, Instrument};

use crate::cancel::StopReason;
use crate::error::{ReapError, Result};
use crate::executor::RunCounters;
use crate::policy::ClassificationPolicy;
use crate::throttle::DeleteThrottle;

pub(crate) async fn run_sharded(
    policy: &ClassificationPolicy,
    counters: Arc<RunCounters>,
    throttle: Arc<DeleteThrottle>,
) -> Result<()> {
    let stop = policy.stop_token();
    let mut tasks = JoinSet::new();
    for (shard, range) in policy.config().shards.iter().cloned().enumerate() {
        let pipeline = policy.clone();
        let counters = Arc::clone(&counters);
        let throttle = Arc::clone(&throttle);
        let span = info_span!("shard", shard, range = %range);
        tasks.spawn(
            async move { (shard, pipeline.run_range(range, counters, throttle).await) }
                .instrument(span),
        );
    }

    let mut first_error: Option<ReapError> = None;
    while let Some(joined) = tasks.join_next().await {
        let error = match joined {
            Ok((shard, Ok(()))) => {
                debug!(shard, "shard complete");
                continue;
            }
            Ok((shard, Err(e))) => {
                if !matches!(e, ReapError::Stopped(_)) {
                    warn!(shard, error = %e, "shard failed, stopping remaining shards");
                }
                e
            }
            Err(join_err) => ReapError::TaskFailed(join_err.to_string()),
        };
        stop.stop(StopReason::ShardFailed);
        // Keep the root cause rather than the stops it triggered.
        let replace = match &first_error {
            None => true,
            Some(ReapError::Stopped(_)) => !matches!(error, ReapError::Stopped(_)),
            Some(_) => false,
        };
        if replace {
            first_error = Some(error);
        }
    }
    first_error.map_or(Ok(()), Err)
}
