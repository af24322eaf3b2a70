//! Ordering service: explicit per-owner note sequences.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use braid_core::{Event, EventHub, OrderRepository, Result};

/// Replaces an owner's explicit note order and notifies their subscribers.
pub struct OrderingService {
    orders: Arc<dyn OrderRepository>,
    hub: Arc<EventHub>,
}

impl OrderingService {
    pub fn new(orders: Arc<dyn OrderRepository>, hub: Arc<EventHub>) -> Self {
        Self { orders, hub }
    }

    /// Replace the owner's entire order with `note_ids`.
    ///
    /// Duplicates collapse to their first occurrence; every surviving id must
    /// be owned by the caller or public, or the whole request is rejected.
    /// Returns the stored sequence.
    pub async fn set_order(&self, owner_id: i64, note_ids: &[i64]) -> Result<Vec<i64>> {
        let mut seen = HashSet::with_capacity(note_ids.len());
        let deduped: Vec<i64> = note_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        self.orders.replace_order(owner_id, &deduped).await?;

        debug!(
            subsystem = "service",
            component = "ordering",
            op = "set_order",
            owner_id = owner_id,
            result_count = deduped.len(),
            "order set"
        );

        self.hub.send_to_owner(
            owner_id,
            &Event::NotesReordered {
                note_ids: deduped.clone(),
            },
        );

        Ok(deduped)
    }
}
