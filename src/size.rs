//! Node shape dimensions from title text and an optional key image.

use std::time::Duration;

use crate::measure::{
    Extent, FontFamily, ImageDimensions, ImageLoader, MeasureError, SizeStyle, TextMeasurer,
};
use crate::registry::Registry;
use crate::settings::Settings;

pub const BASE_PADDING: f64 = 24.0;
pub const MAX_IMAGE_HEIGHT: f64 = 250.0;
pub const IMAGE_GAP: f64 = 8.0;
pub const BOTTOM_SPACING: f64 = 8.0;
pub const IMAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Inputs for one size computation.
#[derive(Debug, Clone, Copy)]
pub struct SizeRequest<'a> {
    pub title: &'a str,
    pub node_type_id: &'a str,
    pub image_src: Option<&'a str>,
    pub size: SizeStyle,
    pub font_family: FontFamily,
}

/// Computes discourse node shape sizes. Holds no state between calls.
pub struct NodeSizeCalculator<'a, M, L> {
    settings: &'a Settings,
    measurer: &'a M,
    loader: &'a L,
    timeout: Duration,
}

impl<'a, M, L> NodeSizeCalculator<'a, M, L>
where
    M: TextMeasurer,
    L: ImageLoader,
{
    pub fn new(settings: &'a Settings, measurer: &'a M, loader: &'a L) -> Self {
        Self {
            settings,
            measurer,
            loader,
            timeout: IMAGE_LOAD_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn compute_size(&self, req: SizeRequest<'_>) -> Extent {
        let registry = Registry::new(self.settings);
        let node_type = registry.node_type(req.node_type_id);
        let subtitle = node_type.map(|n| n.name.as_str()).unwrap_or_default();
        if node_type.is_none() {
            tracing::debug!("Sizing node with unknown type {}", req.node_type_id);
        }

        let Extent { w, h: text_height } =
            self.measurer
                .measure_text(req.title, subtitle, req.size, req.font_family);
        let text_only = Extent {
            w,
            h: text_height + BOTTOM_SPACING,
        };

        let Some(src) = req.image_src else {
            return text_only;
        };
        if !node_type.is_some_and(|n| n.key_image) {
            return text_only;
        }

        let dims = match self.load_image(src).await {
            Ok(dims) => dims,
            Err(e) => {
                tracing::warn!("Falling back to text-only size: {}", e);
                return text_only;
            }
        };

        let (w, image_height) = fit_image(w, dims);
        Extent {
            w,
            h: text_height + image_height + IMAGE_GAP + BOTTOM_SPACING,
        }
    }

    async fn load_image(&self, src: &str) -> Result<ImageDimensions, MeasureError> {
        let dims = tokio::time::timeout(self.timeout, self.loader.load_image(src))
            .await
            .map_err(|_| MeasureError::Timeout {
                src: src.to_string(),
                secs: self.timeout.as_secs(),
            })??;

        let usable = dims.width.is_finite()
            && dims.height.is_finite()
            && dims.width > 0.0
            && dims.height > 0.0;
        if !usable {
            return Err(MeasureError::Failure {
                src: src.to_string(),
                reason: format!("invalid dimensions {}x{}", dims.width, dims.height),
            });
        }
        Ok(dims)
    }
}

/// Image height for a shape of text width `w`, widening the shape when the
/// height cap would otherwise crop the image.
fn fit_image(w: f64, dims: ImageDimensions) -> (f64, f64) {
    let aspect_ratio = dims.width / dims.height;
    let effective_width = w + BASE_PADDING;
    let natural_height = effective_width / aspect_ratio;

    if natural_height <= MAX_IMAGE_HEIGHT {
        return (w, natural_height);
    }
    let required_width = MAX_IMAGE_HEIGHT * aspect_ratio + BASE_PADDING;
    (w.max(required_width), MAX_IMAGE_HEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::{FixedImageLoader, TextMetrics};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed extent regardless of input.
    struct FlatMeasurer(Extent);

    impl TextMeasurer for FlatMeasurer {
        fn measure_text(&self, _: &str, _: &str, _: SizeStyle, _: FontFamily) -> Extent {
            self.0
        }
    }

    struct CountingMeasurer(AtomicUsize);

    impl TextMeasurer for CountingMeasurer {
        fn measure_text(&self, title: &str, _: &str, _: SizeStyle, _: FontFamily) -> Extent {
            self.0.fetch_add(1, Ordering::SeqCst);
            Extent {
                w: title.len() as f64 * 10.0,
                h: 40.0,
            }
        }
    }

    struct HangingLoader;

    #[async_trait]
    impl ImageLoader for HangingLoader {
        async fn load_image(&self, _: &str) -> Result<ImageDimensions, MeasureError> {
            std::future::pending().await
        }
    }

    fn image_settings() -> Settings {
        let mut settings = Settings::default();
        for node_type in &mut settings.node_types {
            if node_type.id == "evidence" {
                node_type.key_image = true;
            }
        }
        settings
    }

    fn request<'a>(title: &'a str, node_type_id: &'a str, image: Option<&'a str>) -> SizeRequest<'a> {
        SizeRequest {
            title,
            node_type_id,
            image_src: image,
            size: SizeStyle::S,
            font_family: FontFamily::Draw,
        }
    }

    #[tokio::test]
    async fn test_text_only() {
        let settings = image_settings();
        let measurer = FlatMeasurer(Extent { w: 200.0, h: 60.0 });
        let loader = FixedImageLoader::new(100.0, 100.0);
        let calc = NodeSizeCalculator::new(&settings, &measurer, &loader);

        let size = calc.compute_size(request("CLM - x", "claim", None)).await;
        assert_eq!(size, Extent { w: 200.0, h: 60.0 + BOTTOM_SPACING });
    }

    #[tokio::test]
    async fn test_image_ignored_without_key_image() {
        let settings = image_settings();
        let measurer = FlatMeasurer(Extent { w: 200.0, h: 60.0 });
        let loader = FixedImageLoader::new(100.0, 100.0);
        let calc = NodeSizeCalculator::new(&settings, &measurer, &loader);

        let size = calc.compute_size(request("CLM - x", "claim", Some("a.png"))).await;
        assert_eq!(size.h, 60.0 + BOTTOM_SPACING);
    }

    #[tokio::test]
    async fn test_unknown_type_measures_with_empty_subtitle() {
        let settings = image_settings();
        let measurer = TextMetrics::default();
        let loader = FixedImageLoader::default();
        let calc = NodeSizeCalculator::new(&settings, &measurer, &loader);

        let size = calc.compute_size(request("Orphan", "deleted", Some("a.png"))).await;
        let expected = measurer.measure_text("Orphan", "", SizeStyle::S, FontFamily::Draw);
        assert_eq!(size, Extent { w: expected.w, h: expected.h + BOTTOM_SPACING });
    }

    #[tokio::test]
    async fn test_wide_image_keeps_text_width() {
        let settings = image_settings();
        let measurer = FlatMeasurer(Extent { w: 216.0, h: 60.0 });
        let loader = FixedImageLoader::new(480.0, 240.0);
        let calc = NodeSizeCalculator::new(&settings, &measurer, &loader);

        let size = calc.compute_size(request("EVD - x", "evidence", Some("a.png"))).await;
        // effective width 240, aspect 2 -> image height 120
        assert_eq!(size.w, 216.0);
        assert_eq!(size.h, 60.0 + 120.0 + IMAGE_GAP + BOTTOM_SPACING);
    }

    #[tokio::test]
    async fn test_tall_image_is_capped_and_widens() {
        let settings = image_settings();
        let measurer = FlatMeasurer(Extent { w: 180.0, h: 60.0 });
        let loader = FixedImageLoader::new(300.0, 400.0);
        let calc = NodeSizeCalculator::new(&settings, &measurer, &loader);

        let size = calc.compute_size(request("EVD - x", "evidence", Some("a.png"))).await;
        // aspect 0.75: 204 / 0.75 > 250, so height caps and width needs 187.5 + 24
        let aspect = 0.75;
        assert_eq!(size.h, 60.0 + MAX_IMAGE_HEIGHT + IMAGE_GAP + BOTTOM_SPACING);
        assert!(size.w >= MAX_IMAGE_HEIGHT * aspect + BASE_PADDING);
        assert_eq!(size.w, 211.5);
    }

    #[tokio::test]
    async fn test_cap_width_bound_holds() {
        let settings = image_settings();
        let loader_dims = [(10.0, 1000.0), (300.0, 400.0), (90.0, 100.0), (1.0, 3.0)];
        for text_w in [50.0, 160.0, 400.0] {
            for (iw, ih) in loader_dims {
                let measurer = FlatMeasurer(Extent { w: text_w, h: 40.0 });
                let loader = FixedImageLoader::new(iw, ih);
                let calc = NodeSizeCalculator::new(&settings, &measurer, &loader);
                let size = calc.compute_size(request("EVD - x", "evidence", Some("a"))).await;

                let aspect = iw / ih;
                if (text_w + BASE_PADDING) / aspect > MAX_IMAGE_HEIGHT {
                    assert!(size.w >= MAX_IMAGE_HEIGHT * aspect + BASE_PADDING);
                }
                assert!(size.w >= text_w);
            }
        }
    }

    #[tokio::test]
    async fn test_image_failure_degrades() {
        let settings = image_settings();
        let measurer = FlatMeasurer(Extent { w: 200.0, h: 60.0 });
        let loader = FixedImageLoader::default();
        let calc = NodeSizeCalculator::new(&settings, &measurer, &loader);

        let size = calc.compute_size(request("EVD - x", "evidence", Some("gone.png"))).await;
        assert_eq!(size, Extent { w: 200.0, h: 60.0 + BOTTOM_SPACING });
    }

    #[tokio::test]
    async fn test_degenerate_image_degrades() {
        let settings = image_settings();
        let measurer = FlatMeasurer(Extent { w: 200.0, h: 60.0 });
        let loader = FixedImageLoader::new(100.0, 0.0);
        let calc = NodeSizeCalculator::new(&settings, &measurer, &loader);

        let size = calc.compute_size(request("EVD - x", "evidence", Some("a.png"))).await;
        assert_eq!(size.h, 60.0 + BOTTOM_SPACING);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_timeout_degrades() {
        let settings = image_settings();
        let measurer = FlatMeasurer(Extent { w: 200.0, h: 60.0 });
        let calc = NodeSizeCalculator::new(&settings, &measurer, &HangingLoader);

        let size = calc.compute_size(request("EVD - x", "evidence", Some("slow.png"))).await;
        assert_eq!(size, Extent { w: 200.0, h: 60.0 + BOTTOM_SPACING });

        let err = calc.load_image("slow.png").await.unwrap_err();
        assert_eq!(
            err,
            MeasureError::Timeout {
                src: "slow.png".to_string(),
                secs: 10
            }
        );

        let quick = NodeSizeCalculator::new(&settings, &measurer, &HangingLoader)
            .with_timeout(Duration::from_secs(2));
        let err = quick.load_image("slow.png").await.unwrap_err();
        assert!(matches!(err, MeasureError::Timeout { secs: 2, .. }));
    }

    #[tokio::test]
    async fn test_deterministic_and_uncached() {
        let settings = image_settings();
        let measurer = CountingMeasurer(AtomicUsize::new(0));
        let loader = FixedImageLoader::new(640.0, 480.0);
        let calc = NodeSizeCalculator::new(&settings, &measurer, &loader);

        let req = request("EVD - Mice sleep more", "evidence", Some("mice.png"));
        let first = calc.compute_size(req).await;
        let second = calc.compute_size(req).await;
        assert_eq!(first, second);
        assert_eq!(measurer.0.load(Ordering::SeqCst), 2);
    }
}
