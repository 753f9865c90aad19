//! Profiling session: repeated `/profile_run` calls folded into one ledger entry.

use tracing::{info, warn};

use crate::model_runtime::ModelInput;
use crate::profiling::{LedgerEntry, LedgerStore, ProfileAccumulator, UpsertOutcome};

use super::ServiceClient;

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub entry: LedgerEntry,
    pub outcome: UpsertOutcome,
    pub responses: u64,
    pub failures: u64,
    pub summary: String,
}

pub struct ProfileSession<'a> {
    client: &'a ServiceClient,
    store: LedgerStore,
    requests: usize,
    xai_method: Option<String>,
}

impl<'a> ProfileSession<'a> {
    pub fn new(client: &'a ServiceClient, store: LedgerStore, requests: usize) -> Self {
        Self {
            client,
            store,
            requests,
            xai_method: None,
        }
    }

    pub fn with_xai_method(mut self, method: impl Into<String>) -> Self {
        self.xai_method = Some(method.into());
        self
    }

    /// Send the requests, aggregate, and upsert the result into the ledger.
    /// Failed requests are logged and skipped.
    pub async fn run(&self, input: &ModelInput) -> anyhow::Result<SessionReport> {
        let init_secs = match self.client.initialization_duration().await {
            Ok(secs) => secs,
            Err(e) => {
                warn!("Could not read initialization duration, recording 0: {:#}", e);
                0.0
            }
        };

        let mut accumulator = match &self.xai_method {
            Some(method) => ProfileAccumulator::for_xai_method(init_secs, method.clone()),
            None => ProfileAccumulator::new(init_secs),
        };

        let mut failures = 0u64;
        for i in 0..self.requests {
            match self.client.profile_run(input, self.xai_method.as_deref()).await {
                Ok(response) => accumulator.process_new_response(Some(&response)),
                Err(e) => {
                    failures += 1;
                    warn!("Profiling request {}/{} failed: {:#}", i + 1, self.requests, e);
                    accumulator.process_new_response(None);
                }
            }
        }

        let summary = accumulator.summary();
        let entry = accumulator.finalize()?;

        let store = self.store.clone();
        let upserted = entry.clone();
        let outcome = tokio::task::spawn_blocking(move || store.update(|data| Ok(data.upsert(upserted)))).await??;

        info!(
            "Profiled node {} with {} responses ({} failed), ledger entry {:?}",
            entry.node_id,
            accumulator.response_count(),
            failures,
            outcome
        );

        Ok(SessionReport {
            entry,
            outcome,
            responses: accumulator.response_count(),
            failures,
            summary,
        })
    }
}
