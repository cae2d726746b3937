//! Bus frame tracking and flush scheduling

/// Number of frames of host time between flush callbacks
pub const FLUSH_INTERVAL_FRAMES: u16 = 16;

/// Frame numbers are 11 bits wide
const FRAME_MASK: u16 = 0x7FF;

/// Tracks start-of-frame ticks across polls
///
/// Elapsed time is measured with the host's frame numbers, so ticks that
/// coalesce between two polls still count toward the next flush.
#[derive(Debug, Default)]
pub(crate) struct FrameTracker {
    /// Last observed frame number
    last: Option<u16>,
    /// Set on every tick, cleared by the caller
    got_frame: bool,
    /// Frames elapsed since the last flush
    since_flush: u16,
}

impl FrameTracker {
    pub(crate) const fn new() -> Self {
        FrameTracker {
            last: None,
            got_frame: false,
            since_flush: 0,
        }
    }

    /// Record a frame tick, returning `true` if a flush is due
    pub(crate) fn tick(&mut self, frame: u16) -> bool {
        let frame = frame & FRAME_MASK;
        let elapsed = match self.last {
            Some(last) => frame.wrapping_sub(last) & FRAME_MASK,
            None => 1,
        };
        self.last = Some(frame);
        self.got_frame = true;

        self.since_flush = self.since_flush.saturating_add(elapsed);
        if self.since_flush >= FLUSH_INTERVAL_FRAMES {
            self.since_flush = 0;
            true
        } else {
            false
        }
    }

    /// Forget everything observed in the previous connection
    pub(crate) fn reset(&mut self) {
        *self = FrameTracker::new();
    }

    pub(crate) fn frame(&self) -> Option<u16> {
        self.last
    }

    pub(crate) fn got_frame(&self) -> bool {
        self.got_frame
    }

    pub(crate) fn take_got_frame(&mut self) -> bool {
        core::mem::replace(&mut self.got_frame, false)
    }
}
