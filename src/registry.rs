//! Marked-plot registry for one directory.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::model::PlotSegment;

/// Column the plot list is sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    PlotIndex,
    PlotLabel,
    Accession,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plot_index" | "plotindex" | "index" => Ok(SortKey::PlotIndex),
            "plot_label" | "plotlabel" | "label" => Ok(SortKey::PlotLabel),
            "accession" => Ok(SortKey::Accession),
            _ => Err(format!("Unknown sort key '{}'", s)),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(format!("Unknown sort order '{}'", s)),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        })
    }
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// Committed plots keyed by plot index.
#[derive(Debug, Clone, Default)]
pub struct PlotRegistry {
    plots: BTreeMap<u32, PlotSegment>,
}

impl PlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.plots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    pub fn get(&self, plot_index: u32) -> Option<&PlotSegment> {
        self.plots.get(&plot_index)
    }

    pub fn contains(&self, plot_index: u32) -> bool {
        self.plots.contains_key(&plot_index)
    }

    pub fn max_plot_index(&self) -> Option<u32> {
        self.plots.keys().next_back().copied()
    }

    /// Add a plot. Fails if the index is taken.
    pub fn add(&mut self, segment: PlotSegment) -> Result<(), SessionError> {
        if self.plots.contains_key(&segment.plot_index) {
            return Err(SessionError::DuplicatePlotIndex(segment.plot_index));
        }
        self.plots.insert(segment.plot_index, segment);
        Ok(())
    }

    /// Remove a plot, freeing its index.
    pub fn remove(&mut self, plot_index: u32) -> Option<PlotSegment> {
        self.plots.remove(&plot_index)
    }

    /// Replace every plot with a fresh listing from the backend.
    pub fn replace_all(&mut self, segments: impl IntoIterator<Item = PlotSegment>) {
        self.plots = segments
            .into_iter()
            .map(|s| (s.plot_index, s))
            .collect();
    }

    pub fn clear(&mut self) {
        self.plots.clear();
    }

    /// Plots sorted by `key` in `order`.
    ///
    /// For label and accession, empty values always go last, and for labels
    /// entries containing `_` always follow those without; `order` only
    /// flips the final comparison. Ties fall back to ascending plot index.
    pub fn list(&self, key: SortKey, order: SortOrder) -> Vec<&PlotSegment> {
        let mut plots: Vec<&PlotSegment> = self.plots.values().collect();
        plots.sort_by(|a, b| {
            compare(a, b, key, order).then_with(|| a.plot_index.cmp(&b.plot_index))
        });
        plots
    }
}

fn compare(a: &PlotSegment, b: &PlotSegment, key: SortKey, order: SortOrder) -> Ordering {
    match key {
        SortKey::PlotIndex => order.apply(a.plot_index.cmp(&b.plot_index)),
        SortKey::PlotLabel => {
            let (a, b) = (text(&a.plot_label), text(&b.plot_label));
            empty_last(a, b)
                .then_with(|| a.contains('_').cmp(&b.contains('_')))
                .then_with(|| order.apply(a.cmp(b)))
        }
        SortKey::Accession => {
            let (a, b) = (text(&a.accession), text(&b.accession));
            empty_last(a, b).then_with(|| order.apply(a.cmp(b)))
        }
    }
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or("")
}

/// Orders empty strings after non-empty ones; `Equal` otherwise.
fn empty_last(a: &str, b: &str) -> Ordering {
    a.is_empty().cmp(&b.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StitchDirection;

    fn plot(index: u32) -> PlotSegment {
        PlotSegment::new(index, "s.jpg", "e.jpg", StitchDirection::Down)
    }

    fn labelled(index: u32, label: &str) -> PlotSegment {
        plot(index).with_label(label)
    }

    fn labels(list: &[&PlotSegment]) -> Vec<String> {
        list.iter()
            .map(|p| p.plot_label.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_add_remove_frees_index() {
        let mut registry = PlotRegistry::new();
        registry.add(plot(5)).unwrap();
        assert!(matches!(
            registry.add(plot(5)),
            Err(SessionError::DuplicatePlotIndex(5))
        ));

        assert!(registry.remove(5).is_some());
        assert!(
            registry
                .list(SortKey::PlotIndex, SortOrder::Asc)
                .iter()
                .all(|p| p.plot_index != 5)
        );
        registry.add(plot(5)).unwrap();
        assert!(registry.contains(5));
    }

    #[test]
    fn test_sort_by_index() {
        let mut registry = PlotRegistry::new();
        for i in [3, 10, 1] {
            registry.add(plot(i)).unwrap();
        }
        let asc: Vec<u32> = registry
            .list(SortKey::PlotIndex, SortOrder::Asc)
            .iter()
            .map(|p| p.plot_index)
            .collect();
        assert_eq!(asc, vec![1, 3, 10]);
        let desc: Vec<u32> = registry
            .list(SortKey::PlotIndex, SortOrder::Desc)
            .iter()
            .map(|p| p.plot_index)
            .collect();
        assert_eq!(desc, vec![10, 3, 1]);
        assert_eq!(registry.max_plot_index(), Some(10));
    }

    #[test]
    fn test_sort_by_label_keeps_empty_last() {
        let mut registry = PlotRegistry::new();
        registry.add(labelled(1, "")).unwrap();
        registry.add(labelled(2, "B2")).unwrap();
        registry.add(labelled(3, "A1")).unwrap();

        let asc = registry.list(SortKey::PlotLabel, SortOrder::Asc);
        assert_eq!(labels(&asc), vec!["A1", "B2", ""]);

        let desc = registry.list(SortKey::PlotLabel, SortOrder::Desc);
        assert_eq!(labels(&desc), vec!["B2", "A1", ""]);
    }

    #[test]
    fn test_sort_by_label_puts_underscores_after() {
        let mut registry = PlotRegistry::new();
        registry.add(labelled(1, "")).unwrap();
        registry.add(labelled(2, "B2")).unwrap();
        registry.add(labelled(3, "A1_x")).unwrap();
        registry.add(labelled(4, "C3")).unwrap();
        registry.add(plot(5)).unwrap();

        let asc = registry.list(SortKey::PlotLabel, SortOrder::Asc);
        assert_eq!(labels(&asc), vec!["B2", "C3", "A1_x", "", ""]);
        assert_eq!(asc[3].plot_index, 1);

        let desc = registry.list(SortKey::PlotLabel, SortOrder::Desc);
        assert_eq!(labels(&desc), vec!["C3", "B2", "A1_x", "", ""]);
    }

    #[test]
    fn test_sort_by_accession() {
        let mut registry = PlotRegistry::new();
        registry.add(plot(1).with_accession("PI-200")).unwrap();
        registry.add(plot(2)).unwrap();
        registry.add(plot(3).with_accession("PI-100")).unwrap();

        let order = |o| -> Vec<u32> {
            registry
                .list(SortKey::Accession, o)
                .iter()
                .map(|p| p.plot_index)
                .collect()
        };
        assert_eq!(order(SortOrder::Asc), vec![3, 1, 2]);
        assert_eq!(order(SortOrder::Desc), vec![1, 3, 2]);
    }

    #[test]
    fn test_replace_all() {
        let mut registry = PlotRegistry::new();
        registry.add(plot(1)).unwrap();
        registry.replace_all(vec![plot(7), plot(8)]);
        assert!(!registry.contains(1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_parse_sort_options() {
        assert_eq!("label".parse::<SortKey>(), Ok(SortKey::PlotLabel));
        assert_eq!("DESC".parse::<SortOrder>(), Ok(SortOrder::Desc));
        assert!("size".parse::<SortKey>().is_err());
    }
}
