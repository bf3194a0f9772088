use std::ops::Range;

/// Index recorded for a counter name the registry does not know
pub const NOT_FOUND: u32 = u32::MAX;

/// Display name rendered for [`NOT_FOUND`] samples
pub const UNKNOWN_NAME: &str = "unknown";

/// Maps counter indices to display names.
///
/// Marker names come first, tracked (polled) counters after them. The table
/// is fixed at construction, so an index never changes meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerRegistry {
    names: Vec<String>,
    tracked_start: usize,
}

impl TrackerRegistry {
    pub fn new<M, T>(markers: M, tracked: T) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        let mut names: Vec<String> = markers.into_iter().map(Into::into).collect();
        let tracked_start = names.len();
        names.extend(tracked.into_iter().map(Into::into));
        Self {
            names,
            tracked_start,
        }
    }

    /// Index of `name`, or [`NOT_FOUND`]
    pub fn id_for_name(&self, name: &str) -> u32 {
        self.try_id_for_name(name).unwrap_or(NOT_FOUND)
    }

    pub fn try_id_for_name(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| i as u32)
    }

    /// Display name for `index`; out-of-range indices render as [`UNKNOWN_NAME`]
    pub fn name(&self, index: u32) -> &str {
        self.names
            .get(index as usize)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_NAME)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Indices of the counters the background thread polls
    pub fn tracked_range(&self) -> Range<u32> {
        self.tracked_start as u32..self.names.len() as u32
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
