use crate::sizing::{ObservedSize, ViewportMetrics};

/// The surface a mount draws into: a DOM element with its canvas, or a
/// native window.
///
/// Hosts own the observers that feed [`crate::ShaderMount::handle_resize`]
/// and [`crate::ShaderMount::handle_viewport_change`]; the mount only tells
/// them when to start and stop listening.
pub trait MountHost {
    /// Installs process-wide styling once, however many mounts exist.
    fn install_global_style(&mut self) {}

    /// Makes the drawing surface part of the host.
    fn attach_canvas(&mut self) {}

    /// Publishes the mount on the host for external discovery.
    fn mark_mounted(&mut self) {}

    fn unmark_mounted(&mut self) {}

    fn connect_observers(&mut self) {}

    fn disconnect_observers(&mut self) {}

    /// Last known CSS size of the host box, if layout has happened.
    fn observed_size(&self) -> Option<ObservedSize>;

    fn viewport_metrics(&self) -> ViewportMetrics;

    /// Sets the backing store to `width × height` physical pixels.
    fn resize_canvas(&mut self, width: u32, height: u32);

    /// Called after each draw; native hosts swap buffers here.
    fn present(&mut self) {}
}
