//! Background period-end sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::BillingEngine;

/// Spawn a task that closes due periods every `interval`.
///
/// The first sweep runs immediately so periods that ended while the service
/// was down are invoiced on startup.
pub fn spawn_sweeper(engine: Arc<BillingEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match engine.sweep_all(Utc::now()).await {
                Ok(report) if report.invoices_issued > 0 || report.failures > 0 => {
                    tracing::info!(
                        assessors_checked = report.assessors_checked,
                        invoices_issued = report.invoices_issued,
                        failures = report.failures,
                        "Period sweep complete"
                    );
                }
                Ok(report) => {
                    tracing::debug!(
                        assessors_checked = report.assessors_checked,
                        "Period sweep found nothing due"
                    );
                }
                Err(e) => tracing::error!(error = %e, "Period sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LeadChargeRequest, NewAssessor};
    use epc_billing_core::{BillingPolicy, InvoiceStatus, LedgerChanges, PostcodePricing};
    use epc_billing_store::{MemoryStore, Store};

    #[tokio::test]
    async fn sweeper_invoices_overdue_periods() {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(BillingEngine::new(
            store.clone(),
            BillingPolicy::default(),
            Arc::new(PostcodePricing::default()),
            None,
        ));

        let assessor = engine
            .register_assessor(NewAssessor {
                assessor_id: None,
                display_name: "Sweep Ltd".into(),
                email: None,
            })
            .await
            .unwrap();
        let receipt = engine
            .record_lead_charge(LeadChargeRequest {
                assessor_id: assessor.id,
                lead_id: "lead-1".into(),
                postcode: "SW1A 1AA".into(),
                amount_pence: Some(1500),
            })
            .await
            .unwrap();

        // Backdate the open period so it is already past its calendar end.
        let mut period = store.get_period(&receipt.period_id).unwrap().unwrap();
        period.scheduled_end = Utc::now() - chrono::Duration::hours(1);
        store
            .commit(&LedgerChanges {
                periods: vec![period],
                ..LedgerChanges::default()
            })
            .unwrap();

        let handle = spawn_sweeper(engine.clone(), Duration::from_millis(20));
        let mut issued = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            issued = store.list_invoices_by_assessor(&assessor.id, 10, 0).unwrap();
            if !issued.is_empty() {
                break;
            }
        }
        handle.abort();

        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].status, InvoiceStatus::Pending);
        assert_eq!(issued[0].amount_due_pence(), 1500);
    }
}
