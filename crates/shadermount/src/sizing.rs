//! Backing-store sizing under a pixel budget.
//!
//! Browsers fold page zoom into `devicePixelRatio` (Safari excepted) and
//! report pinch zoom separately through the visual viewport. The render
//! scale undoes the former and reapplies both so the canvas keeps a
//! constant physical resolution, then clamps the pixel count.

/// Size of the host box in CSS pixels, as delivered by the resize observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedSize {
    pub width: f64,
    pub height: f64,
}

impl ObservedSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualViewport {
    /// Pinch-zoom factor.
    pub scale: f64,
    /// Visible width in CSS pixels.
    pub width: f64,
}

/// Display state sampled whenever the target is recomputed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMetrics {
    pub device_pixel_ratio: f64,
    pub visual_viewport: Option<VisualViewport>,
    pub outer_width: Option<f64>,
    pub inner_width: Option<f64>,
    /// Safari already reports the physical ratio in `devicePixelRatio`.
    pub is_safari: bool,
}

impl ViewportMetrics {
    /// Metrics for a surface with no zoom concept (a native window).
    pub fn with_device_pixel_ratio(device_pixel_ratio: f64) -> Self {
        Self {
            device_pixel_ratio,
            visual_viewport: None,
            outer_width: None,
            inner_width: None,
            is_safari: false,
        }
    }

    pub fn pinch_zoom(&self) -> f64 {
        self.visual_viewport
            .map(|viewport| viewport.scale)
            .filter(|scale| scale.is_finite() && *scale > 0.0)
            .unwrap_or(1.0)
    }

    /// Classic page zoom, rounded to four decimals so sub-pixel layout noise
    /// does not register as a change.
    pub fn classic_zoom(&self) -> f64 {
        let Some(outer) = self.outer_width else {
            return 1.0;
        };
        let visible = match self.visual_viewport {
            Some(viewport) => Some(viewport.width * viewport.scale),
            None => self.inner_width,
        };
        let Some(visible) = visible else {
            return 1.0;
        };
        let zoom = round4(outer / visible);
        if zoom.is_finite() && zoom > 0.0 {
            zoom
        } else {
            1.0
        }
    }

    pub fn real_pixel_ratio(&self) -> f64 {
        let dpr = if self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        };
        if self.is_safari {
            dpr
        } else {
            dpr / self.classic_zoom()
        }
    }
}

impl Default for ViewportMetrics {
    fn default() -> Self {
        Self::with_device_pixel_ratio(1.0)
    }
}

/// Safari reports a UA containing "Safari"; Chromium and Android browsers
/// also do, so they are excluded explicitly.
pub fn is_safari_user_agent(user_agent: &str) -> bool {
    user_agent.contains("Safari") && !user_agent.contains("Chrome") && !user_agent.contains("Android")
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Backing-store dimensions and the scale uploaded as `u_pixelRatio`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

impl RenderTarget {
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Computes the backing store for `size` CSS pixels.
///
/// `width × height` never exceeds `max_pixel_count`. Without the budget
/// binding, `scale ≥ min_pixel_ratio × classic_zoom × pinch_zoom`.
pub fn compute_render_target(
    size: ObservedSize,
    metrics: &ViewportMetrics,
    min_pixel_ratio: f64,
    max_pixel_count: u64,
) -> RenderTarget {
    let css_width = sanitize(size.width);
    let css_height = sanitize(size.height);

    let classic_zoom = metrics.classic_zoom();
    let target_pixel_ratio = metrics.real_pixel_ratio().max(min_pixel_ratio);
    let target_scale = target_pixel_ratio * classic_zoom * metrics.pinch_zoom();

    let raw_width = css_width * target_scale;
    let raw_height = css_height * target_scale;
    let budget = max_pixel_count as f64;

    let rounded_width = raw_width.round();
    let rounded_height = raw_height.round();
    if rounded_width * rounded_height <= budget {
        return RenderTarget {
            width: rounded_width as u32,
            height: rounded_height as u32,
            scale: target_scale,
        };
    }

    let factor = (budget / (raw_width * raw_height)).sqrt().min(1.0);
    let mut width = (raw_width * factor).floor() as u64;
    let mut height = (raw_height * factor).floor() as u64;
    while width * height > max_pixel_count {
        if width >= height {
            width -= 1;
        } else {
            height -= 1;
        }
    }

    RenderTarget {
        width: width as u32,
        height: height as u32,
        scale: target_scale * factor,
    }
}

fn sanitize(css: f64) -> f64 {
    if css.is_finite() && css > 0.0 {
        css
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BUDGET: u64 = 1920 * 1080 * 4;

    #[test]
    fn min_pixel_ratio_lifts_low_dpr_displays() {
        let metrics = ViewportMetrics::with_device_pixel_ratio(1.0);
        let target = compute_render_target(ObservedSize::new(400.0, 300.0), &metrics, 2.0, BUDGET);
        assert_eq!(target, RenderTarget { width: 800, height: 600, scale: 2.0 });
    }

    #[test]
    fn high_dpr_is_used_as_is() {
        let metrics = ViewportMetrics::with_device_pixel_ratio(3.0);
        let target = compute_render_target(ObservedSize::new(100.0, 50.0), &metrics, 2.0, BUDGET);
        assert_eq!((target.width, target.height), (300, 150));
        assert_eq!(target.scale, 3.0);
    }

    #[test]
    fn budget_scales_both_dimensions_uniformly() {
        let metrics = ViewportMetrics::with_device_pixel_ratio(2.0);
        let target = compute_render_target(ObservedSize::new(4000.0, 2000.0), &metrics, 2.0, BUDGET);
        assert!(target.pixel_count() <= BUDGET);
        let aspect = target.width as f64 / target.height as f64;
        assert!((aspect - 2.0).abs() < 0.01);
        assert!(target.scale < 2.0);
    }

    #[test]
    fn browser_zoom_is_divided_out_and_reapplied() {
        // 200% page zoom on a 1x display: Chrome reports dpr 2.
        let metrics = ViewportMetrics {
            device_pixel_ratio: 2.0,
            visual_viewport: Some(VisualViewport { scale: 1.0, width: 640.0 }),
            outer_width: Some(1280.0),
            inner_width: Some(640.0),
            is_safari: false,
        };
        assert_eq!(metrics.classic_zoom(), 2.0);
        assert_eq!(metrics.real_pixel_ratio(), 1.0);
        let target = compute_render_target(ObservedSize::new(100.0, 100.0), &metrics, 1.0, BUDGET);
        assert_eq!(target.scale, 2.0);
    }

    #[test]
    fn safari_trusts_device_pixel_ratio() {
        let metrics = ViewportMetrics {
            device_pixel_ratio: 2.0,
            visual_viewport: Some(VisualViewport { scale: 1.0, width: 640.0 }),
            outer_width: Some(1280.0),
            inner_width: Some(640.0),
            is_safari: true,
        };
        assert_eq!(metrics.real_pixel_ratio(), 2.0);
        let target = compute_render_target(ObservedSize::new(100.0, 100.0), &metrics, 1.0, BUDGET);
        assert_eq!(target.scale, 4.0);
    }

    #[test]
    fn pinch_zoom_multiplies_scale() {
        let metrics = ViewportMetrics {
            device_pixel_ratio: 2.0,
            visual_viewport: Some(VisualViewport { scale: 1.5, width: 400.0 }),
            outer_width: Some(600.0),
            inner_width: Some(600.0),
            is_safari: false,
        };
        assert_eq!(metrics.classic_zoom(), 1.0);
        let target = compute_render_target(ObservedSize::new(10.0, 10.0), &metrics, 2.0, BUDGET);
        assert_eq!(target.scale, 3.0);
        assert_eq!((target.width, target.height), (30, 30));
    }

    #[test]
    fn classic_zoom_falls_back_to_inner_width() {
        let metrics = ViewportMetrics {
            device_pixel_ratio: 1.0,
            visual_viewport: None,
            outer_width: Some(1500.0),
            inner_width: Some(1000.0),
            is_safari: false,
        };
        assert_eq!(metrics.classic_zoom(), 1.5);
    }

    #[test]
    fn degenerate_metrics_fall_back_to_unity() {
        let metrics = ViewportMetrics {
            device_pixel_ratio: f64::NAN,
            visual_viewport: Some(VisualViewport { scale: 0.0, width: 0.0 }),
            outer_width: Some(800.0),
            inner_width: None,
            is_safari: false,
        };
        assert_eq!(metrics.classic_zoom(), 1.0);
        assert_eq!(metrics.pinch_zoom(), 1.0);
        assert_eq!(metrics.real_pixel_ratio(), 1.0);
    }

    #[test]
    fn safari_detection_excludes_chromium_and_android() {
        let safari = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";
        let chrome = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
        let android = "Mozilla/5.0 (Linux; Android 14) AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 Safari/537.36";
        assert!(is_safari_user_agent(safari));
        assert!(!is_safari_user_agent(chrome));
        assert!(!is_safari_user_agent(android));
        assert!(!is_safari_user_agent("Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0"));
    }

    #[test]
    fn empty_box_yields_empty_target() {
        let metrics = ViewportMetrics::default();
        let target = compute_render_target(ObservedSize::new(0.0, -5.0), &metrics, 2.0, BUDGET);
        assert_eq!(target.pixel_count(), 0);
    }

    fn arb_metrics() -> impl Strategy<Value = ViewportMetrics> {
        (
            0.5f64..4.0,
            proptest::option::of((0.5f64..3.0, 200.0f64..3000.0)),
            proptest::option::of(200.0f64..4000.0),
            proptest::option::of(200.0f64..4000.0),
            any::<bool>(),
        )
            .prop_map(|(dpr, viewport, outer, inner, is_safari)| ViewportMetrics {
                device_pixel_ratio: dpr,
                visual_viewport: viewport.map(|(scale, width)| VisualViewport { scale, width }),
                outer_width: outer,
                inner_width: inner,
                is_safari,
            })
    }

    proptest! {
        #[test]
        fn pixel_count_never_exceeds_budget(
            sizes in proptest::collection::vec((0.0f64..6000.0, 0.0f64..6000.0), 1..8),
            metrics in arb_metrics(),
            min_ratio in 0.5f64..4.0,
            budget in 1u64..(1920 * 1080 * 4),
        ) {
            for (width, height) in sizes {
                let target = compute_render_target(ObservedSize::new(width, height), &metrics, min_ratio, budget);
                prop_assert!(target.pixel_count() <= budget);
            }
        }

        #[test]
        fn scale_respects_min_pixel_ratio_within_budget(
            width in 1.0f64..800.0,
            height in 1.0f64..600.0,
            dpr in 0.5f64..4.0,
            min_ratio in 0.5f64..3.0,
        ) {
            let metrics = ViewportMetrics::with_device_pixel_ratio(dpr);
            let target = compute_render_target(ObservedSize::new(width, height), &metrics, min_ratio, BUDGET);
            if dpr >= min_ratio {
                prop_assert!(target.scale >= min_ratio);
            }
            prop_assert!(target.scale >= min_ratio.min(dpr));
        }
    }
}
