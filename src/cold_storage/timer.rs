//! Background promotion of elapsed waiting periods.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use crate::cold_storage::workflow::ColdStorageWorkflow;

pub struct ColdStorageTimer {
    workflow: Arc<ColdStorageWorkflow>,
    poll_interval: Duration,
}

impl ColdStorageTimer {
    pub fn new(workflow: Arc<ColdStorageWorkflow>, poll_interval_ms: u64) -> Self {
        Self {
            workflow,
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let promoted = self.workflow.tick();
                    if promoted > 0 {
                        tracing::debug!(promoted, "Waiting periods elapsed");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("Cold storage timer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approvals::ApprovalLedger;
    use crate::clock::ManualClock;
    use crate::cold_storage::types::{ColdStorageRequestType, ColdStorageStatus, NewColdStorageRequest};
    use crate::config::RuntimeSettings;
    use crate::engine::events::{EngineEvent, EventBus};
    use crate::mpc::ShareRegistry;
    use arc_swap::ArcSwap;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_timer_promotes_without_access() {
        let clock = Arc::new(ManualClock::starting_now());
        let events = EventBus::new(64);
        let workflow = Arc::new(ColdStorageWorkflow::new(
            Arc::new(ApprovalLedger::new(clock.clone())),
            Arc::new(ShareRegistry::new(clock.clone())),
            events.clone(),
            Arc::new(ArcSwap::from_pointee(RuntimeSettings::default())),
            clock.clone(),
        ));
        let request = workflow
            .create(NewColdStorageRequest {
                wallet_id: Uuid::new_v4(),
                request_type: ColdStorageRequestType::KeyRecovery,
                amount: None,
                currency: None,
                destination_address: None,
                requested_by: "ops".into(),
                reason: None,
            })
            .unwrap();

        let mut rx = events.subscribe();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(ColdStorageTimer::new(workflow.clone(), 10).run(shutdown_rx));

        clock.advance(chrono::Duration::hours(72));
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            EngineEvent::ColdStorageStatusChanged { to: ColdStorageStatus::ReadyForApproval, request_id, .. }
                if request_id == request.id
        ));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
