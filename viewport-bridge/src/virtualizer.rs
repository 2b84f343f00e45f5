// Copyright (c) James Kassemi, SC, US. All rights reserved.

/// Inclusive range of rendered indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
}

impl VisibleRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    /// Clamps to `count` items; `None` when nothing in range exists.
    pub fn clamp(self, count: usize) -> Option<Self> {
        if count == 0 || self.start >= count {
            return None;
        }
        Some(Self::new(self.start, self.end.min(count - 1)))
    }

    pub fn indices(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ScrollAlign {
    Start,
    #[default]
    Center,
    End,
}

/// Virtualization engine driving a scrolled list.
pub trait Virtualizer {
    /// Currently rendered indices, or `None` before first layout.
    fn visible_range(&self) -> Option<VisibleRange>;

    fn scroll_to_index(&mut self, index: usize, align: ScrollAlign);
}
