//! Per-patient session slots

use crate::models::{ChannelSet, MeasurementSession};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Everything the controller keeps for one patient
pub struct PatientSlot {
    /// Held for the whole of a lifecycle transition (including device I/O)
    pub(crate) lifecycle: Mutex<()>,
    pub(crate) session: RwLock<MeasurementSession>,
    /// Last channel set read for this patient; served while SETTLING
    pub(crate) snapshot: RwLock<Option<Arc<ChannelSet>>>,
    retired: AtomicBool,
}

impl PatientSlot {
    fn new(patient_id: i64, last_sequence: u64) -> Self {
        let mut session = MeasurementSession::idle(patient_id);
        session.sequence = last_sequence;

        Self {
            lifecycle: Mutex::new(()),
            session: RwLock::new(session),
            snapshot: RwLock::new(None),
            retired: AtomicBool::new(false),
        }
    }

    /// Copy of the current session
    pub async fn current(&self) -> MeasurementSession {
        self.session.read().await.clone()
    }

    /// Removed from the registry; holders must look the patient up again
    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

/// Session slots keyed by patient id
///
/// A slot is created on the first `start` and retained until cleared.
/// Sequence numbers survive clearing and restarts (via seeding), so they stay
/// monotonic per patient.
#[derive(Default)]
pub struct SessionRegistry {
    slots: RwLock<HashMap<i64, Arc<PatientSlot>>>,
    retired_sequences: RwLock<HashMap<i64, u64>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose counters continue from previously recorded sequences
    pub fn with_sequences(last_sequences: HashMap<i64, u64>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            retired_sequences: RwLock::new(last_sequences),
        }
    }

    pub async fn get(&self, patient_id: i64) -> Option<Arc<PatientSlot>> {
        self.slots.read().await.get(&patient_id).cloned()
    }

    pub async fn get_or_create(&self, patient_id: i64) -> Arc<PatientSlot> {
        if let Some(slot) = self.get(patient_id).await {
            return slot;
        }

        let seed = self.last_retired_sequence(patient_id).await;
        let mut slots = self.slots.write().await;
        slots
            .entry(patient_id)
            .or_insert_with(|| Arc::new(PatientSlot::new(patient_id, seed)))
            .clone()
    }

    /// Current session, or an IDLE placeholder for unknown patients
    pub async fn current(&self, patient_id: i64) -> MeasurementSession {
        match self.get(patient_id).await {
            Some(slot) => slot.current().await,
            None => {
                let mut session = MeasurementSession::idle(patient_id);
                session.sequence = self.last_retired_sequence(patient_id).await;
                session
            }
        }
    }

    /// Drop a patient's slot
    ///
    /// Returns `Ok(false)` when there was nothing to clear and `Err` with the
    /// current session when it is still active.
    pub async fn clear(&self, patient_id: i64) -> Result<bool, MeasurementSession> {
        let Some(slot) = self.get(patient_id).await else {
            return Ok(false);
        };

        let _guard = slot.lifecycle.lock().await;
        let session = slot.current().await;
        if session.is_active() {
            return Err(session);
        }

        self.retired_sequences
            .write()
            .await
            .insert(patient_id, session.sequence);
        slot.retired.store(true, Ordering::Release);
        self.slots.write().await.remove(&patient_id);
        Ok(true)
    }

    /// Patients currently holding a slot
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Slots whose session is non-terminal
    pub async fn active_count(&self) -> usize {
        let slots: Vec<Arc<PatientSlot>> = self.slots.read().await.values().cloned().collect();
        let mut active = 0;
        for slot in slots {
            if slot.session.read().await.is_active() {
                active += 1;
            }
        }
        active
    }

    async fn last_retired_sequence(&self, patient_id: i64) -> u64 {
        self.retired_sequences
            .read()
            .await
            .get(&patient_id)
            .copied()
            .unwrap_or(0)
    }
}
