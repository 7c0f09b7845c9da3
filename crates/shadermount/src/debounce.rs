use crate::frame::{FrameHandle, FrameScheduler, FrameSlot};

/// Two-frame deferral for visual-viewport changes.
///
/// A classic zoom fires both the viewport listener and the resize observer;
/// waiting two frames lets the observer's resize land first so the recompute
/// sees settled metrics. Pinch zoom only reaches us through this path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewportDebounce {
    #[default]
    Idle,
    First(FrameHandle),
    Second(FrameHandle),
}

impl ViewportDebounce {
    /// Cancels whatever is in flight and starts over from the first frame.
    pub fn schedule<S: FrameScheduler>(&mut self, scheduler: &mut S) {
        self.cancel(scheduler);
        *self = match scheduler.request_frame(FrameSlot::Resize) {
            Some(handle) => ViewportDebounce::First(handle),
            None => ViewportDebounce::Idle,
        };
    }

    /// Advances on a delivered frame. Returns `true` when the recompute
    /// should run now.
    pub fn advance<S: FrameScheduler>(&mut self, handle: FrameHandle, scheduler: &mut S) -> bool {
        match *self {
            ViewportDebounce::First(pending) if pending == handle => {
                *self = match scheduler.request_frame(FrameSlot::Resize) {
                    Some(next) => ViewportDebounce::Second(next),
                    None => ViewportDebounce::Idle,
                };
                false
            }
            ViewportDebounce::Second(pending) if pending == handle => {
                *self = ViewportDebounce::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn cancel<S: FrameScheduler>(&mut self, scheduler: &mut S) {
        if let Some(handle) = self.pending() {
            scheduler.cancel_frame(handle);
        }
        *self = ViewportDebounce::Idle;
    }

    pub fn pending(&self) -> Option<FrameHandle> {
        match *self {
            ViewportDebounce::Idle => None,
            ViewportDebounce::First(handle) | ViewportDebounce::Second(handle) => Some(handle),
        }
    }
}
