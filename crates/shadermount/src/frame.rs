//! Animation-frame scheduling seam.
//!
//! In the browser this is `requestAnimationFrame`; on the desktop it is the
//! window's redraw request. The mount only ever holds one pending handle per
//! slot and ignores callbacks for handles it no longer tracks.

/// Which of the mount's two frame chains a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameSlot {
    /// The animation loop.
    Render,
    /// The two-frame viewport debounce.
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle {
    pub slot: FrameSlot,
    pub id: u64,
}

impl FrameHandle {
    pub fn new(slot: FrameSlot, id: u64) -> Self {
        Self { slot, id }
    }
}

pub trait FrameScheduler {
    /// Asks for a callback before the next paint. `None` means the host can
    /// no longer deliver frames (window closed, page torn down).
    fn request_frame(&mut self, slot: FrameSlot) -> Option<FrameHandle>;

    fn cancel_frame(&mut self, handle: FrameHandle);

    /// Monotonic clock in milliseconds, same timeline as frame timestamps.
    fn now(&self) -> f64;
}
