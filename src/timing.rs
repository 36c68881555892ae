use serde::Serialize;

use crate::error::{Error, Result};
use crate::time_format;

/// Planned and measured time for one slide.
///
/// `difference` is always `actual_seconds - planned_seconds`; the fields are
/// private so only [`TimingTracker`] can change them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TimeEntry {
    planned_seconds: u64,
    actual_seconds: u64,
    difference: i64,
}

impl TimeEntry {
    pub fn new(planned_seconds: u64, actual_seconds: u64) -> Self {
        let mut entry = Self {
            planned_seconds,
            actual_seconds,
            difference: 0,
        };
        entry.recompute();
        entry
    }

    pub fn planned_seconds(&self) -> u64 {
        self.planned_seconds
    }

    pub fn actual_seconds(&self) -> u64 {
        self.actual_seconds
    }

    pub fn difference(&self) -> i64 {
        self.difference
    }

    fn recompute(&mut self) {
        let diff = i128::from(self.actual_seconds) - i128::from(self.planned_seconds);
        self.difference = diff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;
    }
}

/// One row of the timing table, ready to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRow {
    /// 1-based, as shown to the presenter
    pub slide_number: usize,
    pub planned: String,
    pub actual: String,
    pub difference: String,
    /// Non-negative difference; the table highlights these as misses
    pub over_budget: bool,
}

impl TimeRow {
    fn from_entry(index: usize, entry: &TimeEntry) -> Self {
        Self {
            slide_number: index + 1,
            planned: time_format::format(entry.planned_seconds),
            actual: time_format::format(entry.actual_seconds),
            difference: time_format::format_signed(entry.difference),
            over_budget: entry.difference >= 0,
        }
    }
}

/// Owns the per-slide time table for one deck.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingTracker {
    entries: Vec<TimeEntry>,
}

impl TimingTracker {
    pub fn new(slide_count: usize) -> Self {
        Self {
            entries: vec![TimeEntry::default(); slide_count],
        }
    }

    /// Rebuilds a tracker from persisted entries, re-deriving every difference.
    pub fn from_entries(entries: impl IntoIterator<Item = TimeEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| TimeEntry::new(e.planned_seconds, e.actual_seconds))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Result<&TimeEntry> {
        self.entries.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.entries.len(),
        })
    }

    pub fn set_planned_time(&mut self, index: usize, seconds: u64) -> Result<()> {
        let entry = self.entry_mut(index)?;
        entry.planned_seconds = seconds;
        entry.recompute();
        Ok(())
    }

    pub fn set_actual_time(&mut self, index: usize, seconds: u64) -> Result<()> {
        let entry = self.entry_mut(index)?;
        entry.actual_seconds = seconds;
        entry.recompute();
        Ok(())
    }

    /// Clears every actual time and keeps the planned budgets.
    pub fn reset_all(&mut self) {
        for entry in &mut self.entries {
            entry.actual_seconds = 0;
            entry.recompute();
        }
    }

    /// Grows or shrinks the table to match a changed slide sequence. New
    /// slides start with no budget.
    pub fn resize(&mut self, slide_count: usize) {
        self.entries.resize(slide_count, TimeEntry::default());
    }

    pub fn snapshot(&self) -> Vec<TimeEntry> {
        self.entries.clone()
    }

    pub fn rows(&self) -> Vec<TimeRow> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| TimeRow::from_entry(index, entry))
            .collect()
    }

    pub fn total_planned(&self) -> u64 {
        self.entries
            .iter()
            .fold(0, |acc, e| acc.saturating_add(e.planned_seconds))
    }

    pub fn total_actual(&self) -> u64 {
        self.entries
            .iter()
            .fold(0, |acc, e| acc.saturating_add(e.actual_seconds))
    }

    fn entry_mut(&mut self, index: usize) -> Result<&mut TimeEntry> {
        let len = self.entries.len();
        self.entries
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })
    }
}
