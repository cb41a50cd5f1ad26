//! Per-table readiness gate.
//!
//! Refreshers take an exclusive [`TableLease`] with [`TableGate::acquire`].
//! Readers only call [`TableGate::wait_until_free`], which returns once no
//! refresh holds the lease and does not take it. A reader can therefore pass
//! the gate and then run while a refresh that started right afterwards is
//! clearing the table. Reads are best-effort consistent, not linearizable.
//!
//! Entries are created lazily on first reference, start free, and live as
//! long as the gate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};

struct TableSlot {
    lock: Arc<AsyncMutex<()>>,
    busy: watch::Sender<bool>,
}

impl TableSlot {
    fn new() -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            lock: Arc::new(AsyncMutex::new(())),
            busy,
        }
    }
}

/// Exclusive refresh lease on one table. Dropping it frees the table.
pub struct TableLease {
    table: String,
    slot: Arc<TableSlot>,
    _guard: OwnedMutexGuard<()>,
}

impl TableLease {
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Drop for TableLease {
    fn drop(&mut self) {
        // Must run before `_guard` drops: the next holder sets busy again.
        self.slot.busy.send_replace(false);
    }
}

impl std::fmt::Debug for TableLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableLease").field("table", &self.table).finish()
    }
}

/// Readiness gate for all mirrored tables. Cheap to clone.
#[derive(Clone, Default)]
pub struct TableGate {
    slots: Arc<Mutex<HashMap<String, Arc<TableSlot>>>>,
}

impl TableGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, table: &str) -> Arc<TableSlot> {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            slots
                .entry(table.to_string())
                .or_insert_with(|| Arc::new(TableSlot::new())),
        )
    }

    /// Wait for exclusive access to `table` and mark it refreshing.
    pub async fn acquire(&self, table: impl AsRef<str>) -> TableLease {
        let table = table.as_ref();
        let slot = self.slot(table);
        let guard = Arc::clone(&slot.lock).lock_owned().await;
        slot.busy.send_replace(true);
        TableLease {
            table: table.to_string(),
            slot,
            _guard: guard,
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up with `None` once
    /// `shutdown` turns true. A signal whose sender is gone never fires.
    pub async fn acquire_or_cancel(
        &self,
        table: impl AsRef<str>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<TableLease> {
        if *shutdown.borrow() {
            return None;
        }
        tokio::select! {
            lease = self.acquire(table) => Some(lease),
            Ok(_) = shutdown.wait_for(|stop| *stop) => None,
        }
    }

    /// Wait until no refresh holds `table`. Does not take the lease.
    pub async fn wait_until_free(&self, table: impl AsRef<str>) {
        let mut busy = self.slot(table.as_ref()).busy.subscribe();
        // The sender lives in the slot, which the gate keeps alive.
        let _ = busy.wait_for(|refreshing| !*refreshing).await;
    }

    /// Like [`wait_until_free`](Self::wait_until_free); returns `false` if
    /// `shutdown` fired first.
    pub async fn wait_until_free_or_cancel(
        &self,
        table: impl AsRef<str>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            _ = self.wait_until_free(table) => true,
            Ok(_) = shutdown.wait_for(|stop| *stop) => false,
        }
    }

    pub fn is_refreshing(&self, table: impl AsRef<str>) -> bool {
        *self.slot(table.as_ref()).busy.borrow()
    }

    /// Tables referenced so far.
    pub fn known_tables(&self) -> Vec<String> {
        let slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = slots.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for TableGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableGate")
            .field("tables", &self.known_tables())
            .finish()
    }
}
