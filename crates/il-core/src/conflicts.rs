//! # Conflict Detector
//!
//! Finds every pair of registration-open slots whose time intervals
//! intersect. Slots are compared pairwise: an event carries at most a few
//! hundred slots.
//!
//! Touching intervals count as a conflict: a slot ending at 11:00 conflicts
//! with one starting at 11:00. Whether that should stay so is a policy
//! decision for the organizers, see `DESIGN.md`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Activity, Slot};

/// A slot with its resolved interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSpan {
    pub slot_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SlotSpan {
    /// `None` when the slot end cannot be computed.
    pub fn resolve(slot: &Slot, activity: &Activity) -> Option<Self> {
        Some(Self {
            slot_id: slot.id,
            start: slot.start?,
            end: slot.end(activity)?,
        })
    }
}

/// Two overlapping slots, `first < second` by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ConflictPair {
    pub first: Uuid,
    pub second: Uuid,
}

impl ConflictPair {
    pub fn contains(&self, slot_id: Uuid) -> bool {
        self.first == slot_id || self.second == slot_id
    }
}

/// Boundary-inclusive overlap: with `a.start <= b.start`, the slots conflict
/// iff `b.start <= a.end`.
pub fn slots_conflict(a: &SlotSpan, b: &SlotSpan) -> bool {
    if a.start <= b.start {
        b.start <= a.end
    } else {
        a.start <= b.end
    }
}

/// Returns every conflicting pair among the `subscribing_open` slots.
///
/// Slots whose activity is missing from `activities`, or whose end cannot be
/// computed, never conflict. Output is sorted by `(first, second)`.
pub fn find_conflicts(slots: &[Slot], activities: &HashMap<Uuid, &Activity>) -> Vec<ConflictPair> {
    let mut spans: Vec<SlotSpan> = slots
        .iter()
        .filter(|slot| slot.subscribing_open)
        .filter_map(|slot| SlotSpan::resolve(slot, activities.get(&slot.activity_id)?))
        .collect();
    spans.sort_by_key(|span| span.slot_id);

    let mut pairs = Vec::new();
    for (index, a) in spans.iter().enumerate() {
        for b in &spans[index + 1..] {
            if slots_conflict(a, b) {
                pairs.push(ConflictPair { first: a.slot_id, second: b.slot_id });
            }
        }
    }
    tracing::debug!(open_slots = spans.len(), conflicts = pairs.len(), "slot conflicts computed");
    pairs
}
