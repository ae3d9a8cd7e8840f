use serde::Serialize;
use std::collections::VecDeque;

use crate::heading::heading;
use crate::types::Sample;

/// A buffered sample together with the heading computed when it arrived.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistoryEntry {
    pub sample: Sample,
    pub heading: f64,
}

impl HistoryEntry {
    pub fn new(sample: Sample) -> Self {
        Self {
            heading: heading(sample.x, sample.y),
            sample,
        }
    }
}

/// Index-ordered axis series for the time plot.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PlotSeries {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

/// Fixed-capacity FIFO of recent samples; the oldest entry is evicted on overflow.
#[derive(Clone, Debug)]
pub struct RollingHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl RollingHistory {
    /// Create a history holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RollingHistory {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, computing its heading. Returns the stored entry.
    pub fn push(&mut self, sample: Sample) -> HistoryEntry {
        let entry = HistoryEntry::new(sample);
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        entry
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn series(&self) -> PlotSeries {
        let mut series = PlotSeries {
            x: Vec::with_capacity(self.entries.len()),
            y: Vec::with_capacity(self.entries.len()),
            z: Vec::with_capacity(self.entries.len()),
        };
        for entry in &self.entries {
            series.x.push(entry.sample.x);
            series.y.push(entry.sample.y);
            series.z.push(entry.sample.z);
        }
        series
    }
}
