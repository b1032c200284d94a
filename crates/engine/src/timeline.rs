use crate::project::{Item, ItemId};

/// Cumulative offset table derived from the ordered item list.
///
/// The index is rebuilt from scratch whenever the list or any duration
/// changes; it is never patched in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineIndex {
    ids: Vec<ItemId>,
    offsets: Vec<f64>,
    durations: Vec<f64>,
    total: f64,
}

impl TimelineIndex {
    /// Builds the index from items already sorted by `order`.
    ///
    /// # Example
    /// ```
    /// use engine::project::{Item, MediaRefs, Orientation};
    /// use engine::timeline::TimelineIndex;
    ///
    /// let items: Vec<Item> = [2.0, 3.0, 1.0]
    ///     .iter()
    ///     .enumerate()
    ///     .map(|(order, duration)| Item {
    ///         id: format!("item-{order}"),
    ///         order: order as u32,
    ///         duration: *duration,
    ///         orientation: Orientation::Landscape,
    ///         width: 0,
    ///         height: 0,
    ///         media: MediaRefs::default(),
    ///     })
    ///     .collect();
    ///
    /// let index = TimelineIndex::rebuild(&items);
    /// assert_eq!(index.total(), 6.0);
    /// assert_eq!(index.resolve(2.0), Some(1));
    /// ```
    pub fn rebuild(items: &[Item]) -> Self {
        let mut ids = Vec::with_capacity(items.len());
        let mut offsets = Vec::with_capacity(items.len());
        let mut durations = Vec::with_capacity(items.len());
        let mut total = 0.0;

        for item in items {
            ids.push(item.id.clone());
            offsets.push(total);
            durations.push(item.duration);
            total += item.duration;
        }

        Self {
            ids,
            offsets,
            durations,
            total,
        }
    }

    /// Sum of all item durations in seconds.
    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn start_of(&self, index: usize) -> Option<f64> {
        self.offsets.get(index).copied()
    }

    pub fn duration_of(&self, index: usize) -> Option<f64> {
        self.durations.get(index).copied()
    }

    pub fn item_id(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    /// Resolves `t` seconds to the index of the item showing at that time.
    ///
    /// An exact boundary resolves to the item starting there. Times at or past
    /// the end clamp to the last item; negative or NaN times resolve to the
    /// first one. Returns `None` only for an empty timeline.
    pub fn resolve(&self, t: f64) -> Option<usize> {
        if self.offsets.is_empty() {
            return None;
        }
        if t.is_nan() || t <= 0.0 {
            return Some(0);
        }

        let after = self.offsets.partition_point(|offset| *offset <= t);
        Some(after.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::TimelineIndex;
    use crate::project::{Item, MediaRefs, Orientation};

    fn items(durations: &[f64]) -> Vec<Item> {
        durations
            .iter()
            .enumerate()
            .map(|(order, duration)| Item {
                id: format!("item-{order}"),
                order: order as u32,
                duration: *duration,
                orientation: Orientation::Landscape,
                width: 1920,
                height: 1080,
                media: MediaRefs::default(),
            })
            .collect()
    }

    #[test]
    fn resolve_follows_currently_showing_semantics() {
        let index = TimelineIndex::rebuild(&items(&[2.0, 3.0, 1.0]));

        assert_eq!(index.total(), 6.0);
        assert_eq!(index.resolve(0.0), Some(0));
        assert_eq!(index.resolve(1.9), Some(0));
        assert_eq!(index.resolve(2.0), Some(1));
        assert_eq!(index.resolve(4.9), Some(1));
        assert_eq!(index.resolve(5.0), Some(2));
        assert_eq!(index.resolve(6.0), Some(2));
        assert_eq!(index.resolve(60.0), Some(2));
    }

    #[test]
    fn uniform_durations_produce_evenly_spaced_offsets() {
        let index = TimelineIndex::rebuild(&items(&[1.5, 1.5, 1.5]));

        assert_eq!(index.total(), 4.5);
        assert_eq!(index.offsets(), &[0.0, 1.5, 3.0]);
        assert_eq!(index.duration_of(2), Some(1.5));
        assert_eq!(index.item_id(1), Some("item-1"));
    }

    #[test]
    fn empty_timeline_has_no_active_item() {
        let index = TimelineIndex::rebuild(&[]);

        assert!(index.is_empty());
        assert_eq!(index.total(), 0.0);
        assert_eq!(index.resolve(0.0), None);
    }

    #[test]
    fn negative_and_nan_times_resolve_to_first_item() {
        let index = TimelineIndex::rebuild(&items(&[1.0, 1.0]));

        assert_eq!(index.resolve(-3.0), Some(0));
        assert_eq!(index.resolve(f64::NAN), Some(0));
    }

    proptest! {
        #[test]
        fn total_is_sum_and_end_resolves_to_last(
            durations in prop::collection::vec(0.01f64..30.0, 1..40),
            fraction in 0.001f64..0.999,
        ) {
            let index = TimelineIndex::rebuild(&items(&durations));
            let sum: f64 = durations.iter().sum();
            prop_assert!((index.total() - sum).abs() < 1e-9);

            let last = durations[durations.len() - 1];
            let epsilon = last * fraction;
            prop_assert_eq!(index.resolve(index.total() - epsilon), Some(durations.len() - 1));
        }

        #[test]
        fn resolve_is_monotonic(
            durations in prop::collection::vec(0.01f64..30.0, 1..40),
            mut times in prop::collection::vec(-5.0f64..1_300.0, 2..60),
        ) {
            let index = TimelineIndex::rebuild(&items(&durations));
            times.sort_by(f64::total_cmp);

            let resolved: Vec<usize> = times
                .iter()
                .filter_map(|t| index.resolve(*t))
                .collect();
            prop_assert!(resolved.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }
}
