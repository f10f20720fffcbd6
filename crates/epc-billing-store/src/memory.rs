//! In-memory storage implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use epc_billing_core::{
    Assessor, AssessorId, BillingPeriod, CreditNote, CreditNoteId, Invoice, InvoiceId, LeadId,
    LedgerChanges, PaymentEvent, PeriodId,
};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Default)]
struct State {
    assessors: BTreeMap<AssessorId, Assessor>,
    periods: BTreeMap<PeriodId, BillingPeriod>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    credit_notes: BTreeMap<CreditNoteId, CreditNote>,
    lead_charges: HashMap<LeadId, PeriodId>,
    payment_events: HashMap<String, PaymentEvent>,
}

/// Map-backed storage. Commits apply under a single write lock.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    fail_commits: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent commits fail with a database error.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_string()))
    }
}

fn page<T: Clone>(items: Vec<&T>, limit: usize, offset: usize) -> Vec<T> {
    items.into_iter().rev().skip(offset).take(limit).cloned().collect()
}

impl Store for MemoryStore {
    fn get_assessor(&self, assessor_id: &AssessorId) -> Result<Option<Assessor>> {
        Ok(self.read()?.assessors.get(assessor_id).cloned())
    }

    fn list_assessor_ids(&self) -> Result<Vec<AssessorId>> {
        Ok(self.read()?.assessors.keys().copied().collect())
    }

    fn get_period(&self, period_id: &PeriodId) -> Result<Option<BillingPeriod>> {
        Ok(self.read()?.periods.get(period_id).cloned())
    }

    fn list_open_periods(&self, assessor_id: &AssessorId) -> Result<Vec<BillingPeriod>> {
        Ok(self
            .read()?
            .periods
            .values()
            .filter(|p| &p.assessor_id == assessor_id && p.is_open())
            .cloned()
            .collect())
    }

    fn get_invoice(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>> {
        Ok(self.read()?.invoices.get(invoice_id).cloned())
    }

    fn list_invoices_by_assessor(
        &self,
        assessor_id: &AssessorId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Invoice>> {
        let state = self.read()?;
        let owned = state
            .invoices
            .values()
            .filter(|i| &i.assessor_id == assessor_id)
            .collect();
        Ok(page(owned, limit, offset))
    }

    fn list_outstanding_invoices(&self, assessor_id: &AssessorId) -> Result<Vec<Invoice>> {
        Ok(self
            .read()?
            .invoices
            .values()
            .filter(|i| &i.assessor_id == assessor_id && i.is_outstanding())
            .cloned()
            .collect())
    }

    fn get_credit_note(&self, credit_note_id: &CreditNoteId) -> Result<Option<CreditNote>> {
        Ok(self.read()?.credit_notes.get(credit_note_id).cloned())
    }

    fn list_credit_notes_by_assessor(
        &self,
        assessor_id: &AssessorId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditNote>> {
        let state = self.read()?;
        let owned = state
            .credit_notes
            .values()
            .filter(|c| &c.assessor_id == assessor_id)
            .collect();
        Ok(page(owned, limit, offset))
    }

    fn list_credit_notes_by_invoice(&self, invoice_id: &InvoiceId) -> Result<Vec<CreditNote>> {
        Ok(self
            .read()?
            .credit_notes
            .values()
            .filter(|c| &c.related_invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    fn list_available_credits(&self, assessor_id: &AssessorId) -> Result<Vec<CreditNote>> {
        Ok(self
            .read()?
            .credit_notes
            .values()
            .filter(|c| &c.assessor_id == assessor_id && c.is_available())
            .cloned()
            .collect())
    }

    fn has_lead_charge(&self, lead_id: &LeadId) -> Result<bool> {
        Ok(self.read()?.lead_charges.contains_key(lead_id))
    }

    fn get_payment_event(&self, event_id: &str) -> Result<Option<PaymentEvent>> {
        Ok(self.read()?.payment_events.get(event_id).cloned())
    }

    fn commit(&self, changes: &LedgerChanges) -> Result<()> {
        let mut state = self.write()?;
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Database("commit rejected".to_string()));
        }

        if let Some(assessor) = &changes.assessor {
            state.assessors.insert(assessor.id, assessor.clone());
        }
        for period in &changes.periods {
            state.periods.insert(period.id, period.clone());
        }
        for invoice in &changes.invoices {
            state.invoices.insert(invoice.id, invoice.clone());
        }
        for note in &changes.credit_notes {
            state.credit_notes.insert(note.id, note.clone());
        }
        for (lead_id, period_id) in &changes.lead_charges {
            state.lead_charges.insert(lead_id.clone(), *period_id);
        }
        for event in &changes.payment_events {
            state
                .payment_events
                .insert(event.event_id.clone(), event.clone());
        }
        Ok(())
    }
}
