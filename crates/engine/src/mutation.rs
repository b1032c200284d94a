//! Local halves of the optimistic item-list edits.
//!
//! The engine applies these before talking to the remote and falls back to a
//! full refresh when the remote disagrees.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::project::{Item, ItemId};

/// Rewrites `order` to follow `sequence` and sorts the list accordingly.
///
/// `sequence` must name every item exactly once; anything else is rejected
/// without touching `items`.
///
/// # Example
/// ```
/// use engine::mutation::apply_reorder;
/// use engine::project::{Item, MediaRefs, Orientation};
///
/// let mut items: Vec<Item> = ["a", "b", "c"]
///     .iter()
///     .enumerate()
///     .map(|(order, id)| Item {
///         id: id.to_string(),
///         order: order as u32,
///         duration: 1.0,
///         orientation: Orientation::Square,
///         width: 0,
///         height: 0,
///         media: MediaRefs::default(),
///     })
///     .collect();
///
/// apply_reorder(&mut items, &["c".into(), "a".into(), "b".into()]).unwrap();
/// assert_eq!(items[0].id, "c");
/// assert_eq!(items[0].order, 0);
/// ```
pub fn apply_reorder(items: &mut [Item], sequence: &[ItemId]) -> Result<()> {
    validate_sequence(items, sequence)?;

    for item in items.iter_mut() {
        if let Some(position) = sequence.iter().position(|id| *id == item.id) {
            item.order = position as u32;
        }
    }
    items.sort_by_key(|item| item.order);

    debug!(item_count = items.len(), "reorder applied locally");
    Ok(())
}

/// Returns `duration` when it is a usable display time.
pub fn validate_duration(duration: f64) -> Result<f64> {
    if duration.is_finite() && duration > 0.0 {
        Ok(duration)
    } else {
        Err(EngineError::InvalidDuration { duration })
    }
}

/// True when `order` values are exactly `0..items.len()`.
pub fn has_dense_order(items: &[Item]) -> bool {
    let mut seen = vec![false; items.len()];
    for item in items {
        match seen.get_mut(item.order as usize) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

fn validate_sequence(items: &[Item], sequence: &[ItemId]) -> Result<()> {
    if sequence.len() != items.len() {
        return Err(EngineError::InvalidReorder {
            reason: format!(
                "expected {} item ids, received {}",
                items.len(),
                sequence.len()
            ),
        });
    }

    let known: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
    let mut seen = HashSet::with_capacity(sequence.len());
    for id in sequence {
        if !known.contains(id.as_str()) {
            return Err(EngineError::InvalidReorder {
                reason: format!("unknown item id {id}"),
            });
        }
        if !seen.insert(id.as_str()) {
            return Err(EngineError::InvalidReorder {
                reason: format!("duplicate item id {id}"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_reorder, has_dense_order, validate_duration};
    use crate::error::EngineError;
    use crate::project::{Item, ItemId, MediaRefs, Orientation};

    fn items(ids: &[&str]) -> Vec<Item> {
        ids.iter()
            .enumerate()
            .map(|(order, id)| Item {
                id: (*id).to_owned(),
                order: order as u32,
                duration: 2.0,
                orientation: Orientation::Landscape,
                width: 1600,
                height: 900,
                media: MediaRefs::default(),
            })
            .collect()
    }

    fn ids(values: &[&str]) -> Vec<ItemId> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn reorder_produces_dense_order_following_sequence() {
        let mut list = items(&["a", "b", "c", "d"]);

        apply_reorder(&mut list, &ids(&["d", "b", "a", "c"])).expect("reorder");

        let ordered: Vec<(&str, u32)> = list
            .iter()
            .map(|item| (item.id.as_str(), item.order))
            .collect();
        assert_eq!(ordered, vec![("d", 0), ("b", 1), ("a", 2), ("c", 3)]);
        assert!(has_dense_order(&list));
    }

    #[test]
    fn reorder_rejects_partial_or_duplicate_sequences() {
        let mut list = items(&["a", "b", "c"]);
        let before = list.clone();

        for sequence in [
            ids(&["a", "b"]),
            ids(&["a", "a", "b"]),
            ids(&["a", "b", "x"]),
        ] {
            let result = apply_reorder(&mut list, &sequence);
            assert!(matches!(result, Err(EngineError::InvalidReorder { .. })));
        }
        assert_eq!(list, before);
    }

    #[test]
    fn durations_must_be_positive_and_finite() {
        assert_eq!(validate_duration(1.5).expect("valid"), 1.5);
        assert!(validate_duration(0.0).is_err());
        assert!(validate_duration(-2.0).is_err());
        assert!(validate_duration(f64::INFINITY).is_err());
        assert!(validate_duration(f64::NAN).is_err());
    }

    #[test]
    fn dense_order_detects_gaps_and_duplicates() {
        let mut list = items(&["a", "b", "c"]);
        assert!(has_dense_order(&list));

        list[2].order = 5;
        assert!(!has_dense_order(&list));

        list[2].order = 1;
        assert!(!has_dense_order(&list));
    }
}
