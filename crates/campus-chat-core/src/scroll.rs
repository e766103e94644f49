//! Follow-the-bottom scroll model
//!
//! Units are whatever the host measures in: pixels for a web page, rows for
//! the terminal.

/// Default near-bottom threshold in pixels.
pub const NEAR_BOTTOM_THRESHOLD: u32 = 100;

/// Geometry of the scrollable message list at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub content_height: u32,
    pub offset: u32,
    pub viewport_height: u32,
}

impl Viewport {
    pub fn max_offset(&self) -> u32 {
        self.content_height.saturating_sub(self.viewport_height)
    }

    pub fn distance_from_bottom(&self) -> u32 {
        self.content_height
            .saturating_sub(self.offset)
            .saturating_sub(self.viewport_height)
    }

    pub fn with_offset(self, offset: u32) -> Self {
        Self {
            offset: offset.min(self.max_offset()),
            ..self
        }
    }
}

/// Tracks whether the user has scrolled away from the bottom and whether a
/// scroll-to-bottom has been requested since the last layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollTracker {
    threshold: u32,
    user_has_scrolled_away: bool,
    pending_bottom: bool,
}

impl ScrollTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            user_has_scrolled_away: false,
            pending_bottom: false,
        }
    }

    pub fn user_has_scrolled_away(&self) -> bool {
        self.user_has_scrolled_away
    }

    /// Called for every scroll the user makes.
    pub fn on_scroll(&mut self, viewport: Viewport) {
        self.user_has_scrolled_away = viewport.distance_from_bottom() >= self.threshold;
    }

    /// Ask for the list to be pinned to the bottom at the next layout.
    pub fn request_bottom(&mut self) {
        self.pending_bottom = true;
    }

    pub fn has_pending_request(&self) -> bool {
        self.pending_bottom
    }

    /// Resolves the offset to lay out with. A pending request moves to the
    /// bottom unless the user scrolled away; either way it is consumed.
    pub fn settle(&mut self, viewport: Viewport) -> u32 {
        let pending = std::mem::take(&mut self.pending_bottom);
        if pending && !self.user_has_scrolled_away {
            viewport.max_offset()
        } else {
            viewport.offset.min(viewport.max_offset())
        }
    }

    /// Whether the "new content below" indicator should show.
    pub fn indicator_visible(&self, viewport: Viewport) -> bool {
        viewport.distance_from_bottom() >= self.threshold
    }

    /// Indicator activation: resume following and force a scroll.
    pub fn jump_to_bottom(&mut self) {
        self.user_has_scrolled_away = false;
        self.pending_bottom = true;
    }

    pub fn reset(&mut self) {
        self.user_has_scrolled_away = false;
        self.pending_bottom = false;
    }
}

impl Default for ScrollTracker {
    fn default() -> Self {
        Self::new(NEAR_BOTTOM_THRESHOLD)
    }
}
