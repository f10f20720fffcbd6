//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use epc_billing_core::{
    Assessor, AssessorId, BillingPeriod, CreditNote, CreditNoteId, Invoice, InvoiceId, LeadId,
    LedgerChanges, PaymentEvent, PeriodId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Collect the entity IDs under an owner prefix, oldest first.
    fn scan_index(&self, index_cf: &str, owner: &[u8; 16]) -> Result<Vec<[u8; 16]>> {
        let cf = self.cf(index_cf)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(owner, Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(owner) {
                break;
            }
            if let Some(id) = keys::entity_from_index_key(&key) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Load the indexed entities, optionally newest first with pagination.
    fn load_indexed<T: serde::de::DeserializeOwned>(
        &self,
        index_cf: &str,
        owner: &[u8; 16],
        data_cf: &str,
        page: Option<(usize, usize)>,
    ) -> Result<Vec<T>> {
        let mut ids = self.scan_index(index_cf, owner)?;
        if let Some((limit, offset)) = page {
            ids.reverse();
            ids = ids.into_iter().skip(offset).take(limit).collect();
        }

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.get_value(data_cf, &id)? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Assessors
    // =========================================================================

    fn get_assessor(&self, assessor_id: &AssessorId) -> Result<Option<Assessor>> {
        self.get_value(cf::ASSESSORS, &keys::assessor_key(assessor_id))
    }

    fn list_assessor_ids(&self) -> Result<Vec<AssessorId>> {
        let cf = self.cf(cf::ASSESSORS)?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let bytes: [u8; 16] = key[..]
                .try_into()
                .map_err(|_| StoreError::Database("malformed assessor key".to_string()))?;
            ids.push(AssessorId::from_bytes(bytes));
        }
        Ok(ids)
    }

    // =========================================================================
    // Periods
    // =========================================================================

    fn get_period(&self, period_id: &PeriodId) -> Result<Option<BillingPeriod>> {
        self.get_value(cf::PERIODS, &keys::period_key(period_id))
    }

    fn list_open_periods(&self, assessor_id: &AssessorId) -> Result<Vec<BillingPeriod>> {
        self.load_indexed(
            cf::OPEN_PERIODS_BY_ASSESSOR,
            assessor_id.as_bytes(),
            cf::PERIODS,
            None,
        )
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    fn get_invoice(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>> {
        self.get_value(cf::INVOICES, &keys::invoice_key(invoice_id))
    }

    fn list_invoices_by_assessor(
        &self,
        assessor_id: &AssessorId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Invoice>> {
        self.load_indexed(
            cf::INVOICES_BY_ASSESSOR,
            assessor_id.as_bytes(),
            cf::INVOICES,
            Some((limit, offset)),
        )
    }

    fn list_outstanding_invoices(&self, assessor_id: &AssessorId) -> Result<Vec<Invoice>> {
        self.load_indexed(
            cf::OUTSTANDING_BY_ASSESSOR,
            assessor_id.as_bytes(),
            cf::INVOICES,
            None,
        )
    }

    // =========================================================================
    // Credit notes
    // =========================================================================

    fn get_credit_note(&self, credit_note_id: &CreditNoteId) -> Result<Option<CreditNote>> {
        self.get_value(cf::CREDIT_NOTES, &keys::credit_note_key(credit_note_id))
    }

    fn list_credit_notes_by_assessor(
        &self,
        assessor_id: &AssessorId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditNote>> {
        self.load_indexed(
            cf::CREDIT_NOTES_BY_ASSESSOR,
            assessor_id.as_bytes(),
            cf::CREDIT_NOTES,
            Some((limit, offset)),
        )
    }

    fn list_credit_notes_by_invoice(&self, invoice_id: &InvoiceId) -> Result<Vec<CreditNote>> {
        self.load_indexed(
            cf::CREDIT_NOTES_BY_INVOICE,
            &invoice_id.to_bytes(),
            cf::CREDIT_NOTES,
            None,
        )
    }

    fn list_available_credits(&self, assessor_id: &AssessorId) -> Result<Vec<CreditNote>> {
        self.load_indexed(
            cf::AVAILABLE_CREDITS_BY_ASSESSOR,
            assessor_id.as_bytes(),
            cf::CREDIT_NOTES,
            None,
        )
    }

    // =========================================================================
    // Idempotency records
    // =========================================================================

    fn has_lead_charge(&self, lead_id: &LeadId) -> Result<bool> {
        let cf = self.cf(cf::LEAD_CHARGES)?;
        let exists = self
            .db
            .get_cf(&cf, keys::lead_key(lead_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        Ok(exists)
    }

    fn get_payment_event(&self, event_id: &str) -> Result<Option<PaymentEvent>> {
        self.get_value(cf::PAYMENT_EVENTS, &keys::payment_event_key(event_id))
    }

    // =========================================================================
    // Compound operations
    // =========================================================================

    fn commit(&self, changes: &LedgerChanges) -> Result<()> {
        let cf_assessors = self.cf(cf::ASSESSORS)?;
        let cf_periods = self.cf(cf::PERIODS)?;
        let cf_open = self.cf(cf::OPEN_PERIODS_BY_ASSESSOR)?;
        let cf_invoices = self.cf(cf::INVOICES)?;
        let cf_invoices_by_assessor = self.cf(cf::INVOICES_BY_ASSESSOR)?;
        let cf_outstanding = self.cf(cf::OUTSTANDING_BY_ASSESSOR)?;
        let cf_notes = self.cf(cf::CREDIT_NOTES)?;
        let cf_notes_by_assessor = self.cf(cf::CREDIT_NOTES_BY_ASSESSOR)?;
        let cf_notes_by_invoice = self.cf(cf::CREDIT_NOTES_BY_INVOICE)?;
        let cf_available = self.cf(cf::AVAILABLE_CREDITS_BY_ASSESSOR)?;
        let cf_leads = self.cf(cf::LEAD_CHARGES)?;
        let cf_events = self.cf(cf::PAYMENT_EVENTS)?;

        let mut batch = WriteBatch::default();

        if let Some(assessor) = &changes.assessor {
            batch.put_cf(
                &cf_assessors,
                keys::assessor_key(&assessor.id),
                Self::serialize(assessor)?,
            );
        }

        for period in &changes.periods {
            let index = keys::index_key(period.assessor_id.as_bytes(), period.id.to_bytes());
            batch.put_cf(&cf_periods, keys::period_key(&period.id), Self::serialize(period)?);
            if period.is_open() {
                batch.put_cf(&cf_open, &index, []);
            } else {
                batch.delete_cf(&cf_open, &index);
            }
        }

        for invoice in &changes.invoices {
            let index = keys::index_key(invoice.assessor_id.as_bytes(), invoice.id.to_bytes());
            batch.put_cf(
                &cf_invoices,
                keys::invoice_key(&invoice.id),
                Self::serialize(invoice)?,
            );
            batch.put_cf(&cf_invoices_by_assessor, &index, []);
            if invoice.is_outstanding() {
                batch.put_cf(&cf_outstanding, &index, []);
            } else {
                batch.delete_cf(&cf_outstanding, &index);
            }
        }

        for note in &changes.credit_notes {
            let index = keys::index_key(note.assessor_id.as_bytes(), note.id.to_bytes());
            batch.put_cf(&cf_notes, keys::credit_note_key(&note.id), Self::serialize(note)?);
            batch.put_cf(&cf_notes_by_assessor, &index, []);
            batch.put_cf(
                &cf_notes_by_invoice,
                keys::index_key(&note.related_invoice_id.to_bytes(), note.id.to_bytes()),
                [],
            );
            if note.is_available() {
                batch.put_cf(&cf_available, &index, []);
            } else {
                batch.delete_cf(&cf_available, &index);
            }
        }

        for (lead_id, period_id) in &changes.lead_charges {
            batch.put_cf(&cf_leads, keys::lead_key(lead_id), period_id.to_bytes());
        }

        for event in &changes.payment_events {
            batch.put_cf(
                &cf_events,
                keys::payment_event_key(&event.event_id),
                Self::serialize(event)?,
            );
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::trace!(
            periods = changes.periods.len(),
            invoices = changes.invoices.len(),
            credit_notes = changes.credit_notes.len(),
            "committed ledger changes"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use epc_billing_core::{
        AssessorBook, BillingPolicy, CloseReason, CreditMode, CreditRequest, TrustTierTable,
    };
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn register(store: &RocksStore) -> AssessorId {
        let assessor = Assessor::new(
            AssessorId::generate(),
            "Rocks Assessor",
            Some("billing@example.co.uk".to_string()),
            &TrustTierTable::default(),
            Utc::now(),
        );
        let id = assessor.id;
        let mut book = AssessorBook::register(assessor);
        store.commit(&book.take_changes()).unwrap();
        id
    }

    /// Charge two leads and close the period; returns the invoice.
    fn invoice(store: &RocksStore, id: &AssessorId, tag: &str) -> Invoice {
        let policy = BillingPolicy::default();
        let now = Utc::now();
        let mut book = store.load_book(id).unwrap().unwrap();
        let mut period_id = None;
        for n in 0..2 {
            let lead = LeadId::new(format!("{tag}-{n}")).unwrap();
            period_id = Some(
                book.record_lead_charge(lead, "EH1 1YZ", 1500, &policy, now)
                    .unwrap()
                    .period_id,
            );
        }
        let invoice = book
            .close_period(period_id.unwrap(), CloseReason::Manual, &policy, now)
            .unwrap()
            .unwrap();
        store.commit(&book.take_changes()).unwrap();
        invoice
    }

    #[test]
    fn assessor_roundtrip() {
        let (store, _dir) = create_test_store();
        let id = register(&store);

        let assessor = store.get_assessor(&id).unwrap().unwrap();
        assert_eq!(assessor.display_name, "Rocks Assessor");
        assert_eq!(store.list_assessor_ids().unwrap(), vec![id]);
    }

    #[test]
    fn charge_and_close_maintain_indexes() {
        let (store, _dir) = create_test_store();
        let id = register(&store);
        let issued = invoice(&store, &id, "a");

        assert!(store.has_lead_charge(&LeadId::new("a-0").unwrap()).unwrap());
        assert!(!store.has_lead_charge(&LeadId::new("b-0").unwrap()).unwrap());

        let open = store.list_open_periods(&id).unwrap();
        assert_eq!(open.len(), 1);
        assert_ne!(open[0].id, issued.period_id);

        let closed = store.get_period(&issued.period_id).unwrap().unwrap();
        assert!(!closed.is_open());
        assert_eq!(closed.charges.len(), 2);

        let outstanding = store.list_outstanding_invoices(&id).unwrap();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].amount_pence, 3000);
    }

    #[test]
    fn paid_invoice_leaves_outstanding_index() {
        let (store, _dir) = create_test_store();
        let id = register(&store);
        let issued = invoice(&store, &id, "a");

        let policy = BillingPolicy::default();
        let now = Utc::now();
        let mut book = store.load_book(&id).unwrap().unwrap();
        book.record_payment(issued.clone(), "card", "evt_1", now, &policy, now)
            .unwrap();
        store.commit(&book.take_changes()).unwrap();

        assert!(store.list_outstanding_invoices(&id).unwrap().is_empty());
        assert!(store.get_payment_event("evt_1").unwrap().is_some());
        assert_eq!(store.list_invoices_by_assessor(&id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn invoices_list_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let id = register(&store);
        let first = invoice(&store, &id, "a");
        std::thread::sleep(std::time::Duration::from_millis(2)); // Ensure different ULIDs
        let second = invoice(&store, &id, "b");

        let all = store.list_invoices_by_assessor(&id, 10, 0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].id, first.id);

        let page2 = store.list_invoices_by_assessor(&id, 1, 1).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].id, first.id);
    }

    #[test]
    fn credit_note_indexes() {
        let (store, _dir) = create_test_store();
        let id = register(&store);
        let issued = invoice(&store, &id, "a");
        let period = store.get_period(&issued.period_id).unwrap().unwrap();

        let mut book = store.load_book(&id).unwrap().unwrap();
        let note = book
            .issue_credit(
                &issued,
                &period,
                &[],
                CreditRequest {
                    lead_refs: vec![LeadId::new("a-1").unwrap()],
                    reason: "wrong postcode".to_string(),
                    mode: CreditMode::ApplyToFuture,
                    amount_pence: None,
                },
                Utc::now(),
            )
            .unwrap();
        store.commit(&book.take_changes()).unwrap();

        assert_eq!(store.list_credit_notes_by_invoice(&issued.id).unwrap().len(), 1);
        assert_eq!(store.list_available_credits(&id).unwrap()[0].id, note.id);
        assert_eq!(store.load_book(&id).unwrap().unwrap().credit_balance_pence(), 1500);

        // Consumed by the next invoice.
        invoice(&store, &id, "b");
        assert!(store.list_available_credits(&id).unwrap().is_empty());
        assert_eq!(store.list_credit_notes_by_assessor(&id, 10, 0).unwrap().len(), 1);
    }
}
