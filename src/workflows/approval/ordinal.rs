//! Dense 1-based ordinal maintenance for ordered sibling collections
//! (approval levels within a stage, stages within a workflow version).
//!
//! All three operations compute minimal diffs: a sibling whose ordinal does
//! not change is never written to, and its touch timestamp is left alone.
//! Consumers sort by ordinal and may also sort or cache by update time, so
//! needless churn matters.

use chrono::{DateTime, Utc};

/// A record participating in an ordered sibling collection.
///
/// `touch` defaults to a no-op; variants that track an update timestamp
/// override it and get bumped only when their ordinal actually changed.
pub trait OrdinalItem {
    fn item_id(&self) -> u64;
    fn scope_id(&self) -> u64;
    fn ordinal(&self) -> u32;
    fn set_ordinal(&mut self, ordinal: u32);
    fn touch(&mut self, _at: DateTime<Utc>) {}
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrdinalError {
    #[error("item {item} does not belong to scope {scope}")]
    ForeignItem { item: u64, scope: u64 },
    #[error("new order must list exactly the current items (expected {expected}, found {found})")]
    SizeMismatch { expected: usize, found: usize },
    #[error("new order repeats item {0}")]
    DuplicateItem(u64),
    #[error("new order references item {0} which is not a sibling")]
    UnknownItem(u64),
}

/// Next free ordinal for a new child: `max(existing) + 1`, 1 when the scope
/// is empty.
pub fn allocate<T: OrdinalItem>(siblings: &[T]) -> u32 {
    siblings
        .iter()
        .map(OrdinalItem::ordinal)
        .max()
        .map_or(1, |max| max + 1)
}

/// Close the gap left by a deleted child: every sibling whose ordinal was
/// greater than the removed one is decremented and touched. Returns the
/// number of siblings that changed.
///
/// Panics if `removed` is still present in `siblings` — the caller must
/// delete the record first.
pub fn close_gap<T: OrdinalItem>(
    scope: u64,
    removed: &T,
    siblings: &mut [T],
    now: DateTime<Utc>,
) -> Result<usize, OrdinalError> {
    assert!(
        siblings.iter().all(|s| s.item_id() != removed.item_id()),
        "close_gap invoked on a record that has not been deleted"
    );

    if removed.scope_id() != scope {
        return Err(OrdinalError::ForeignItem {
            item: removed.item_id(),
            scope,
        });
    }
    if let Some(foreign) = siblings.iter().find(|s| s.scope_id() != scope) {
        return Err(OrdinalError::ForeignItem {
            item: foreign.item_id(),
            scope,
        });
    }

    let gap = removed.ordinal();
    let mut changed = 0;
    for sibling in siblings.iter_mut() {
        if sibling.ordinal() > gap {
            sibling.set_ordinal(sibling.ordinal() - 1);
            sibling.touch(now);
            changed += 1;
        }
    }
    Ok(changed)
}

/// Reassign ordinals 1..N following `new_order`, which must be an exact
/// permutation of the current item ids. Only items whose resulting ordinal
/// differs from the prior one are updated and touched; validation failures
/// write nothing. Returns the number of items that changed.
pub fn reorder<T: OrdinalItem>(
    scope: u64,
    items: &mut [T],
    new_order: &[u64],
    now: DateTime<Utc>,
) -> Result<usize, OrdinalError> {
    if new_order.len() != items.len() {
        return Err(OrdinalError::SizeMismatch {
            expected: items.len(),
            found: new_order.len(),
        });
    }
    if let Some(foreign) = items.iter().find(|item| item.scope_id() != scope) {
        return Err(OrdinalError::ForeignItem {
            item: foreign.item_id(),
            scope,
        });
    }

    let mut positions = Vec::with_capacity(new_order.len());
    for &id in new_order {
        let index = items
            .iter()
            .position(|item| item.item_id() == id)
            .ok_or(OrdinalError::UnknownItem(id))?;
        if positions.contains(&index) {
            return Err(OrdinalError::DuplicateItem(id));
        }
        positions.push(index);
    }

    let mut changed = 0;
    for (rank, &index) in positions.iter().enumerate() {
        let target = rank as u32 + 1;
        if items[index].ordinal() != target {
            items[index].set_ordinal(target);
            items[index].touch(now);
            changed += 1;
        }
    }
    Ok(changed)
}
