//! Text and image measurement ports, and a default text measurer based on
//! terminal-style character widths.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthStr;

/// Canvas text size style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeStyle {
    #[default]
    S,
    M,
    L,
    Xl,
}

impl SizeStyle {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "s" => Some(Self::S),
            "m" => Some(Self::M),
            "l" => Some(Self::L),
            "xl" => Some(Self::Xl),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::S => "s",
            Self::M => "m",
            Self::L => "l",
            Self::Xl => "xl",
        }
    }

    /// Font size in canvas units.
    pub fn font_size(self) -> f64 {
        match self {
            Self::S => 18.0,
            Self::M => 24.0,
            Self::L => 36.0,
            Self::Xl => 44.0,
        }
    }
}

impl fmt::Display for SizeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFamily {
    #[default]
    Draw,
    Sans,
    Serif,
    Mono,
}

impl FontFamily {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draw" => Some(Self::Draw),
            "sans" => Some(Self::Sans),
            "serif" => Some(Self::Serif),
            "mono" => Some(Self::Mono),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draw => "draw",
            Self::Sans => "sans",
            Self::Serif => "serif",
            Self::Mono => "mono",
        }
    }

    /// Average advance of a narrow glyph, relative to the font size.
    fn char_width_ratio(self) -> f64 {
        match self {
            Self::Draw | Self::Mono => 0.6,
            Self::Sans | Self::Serif => 0.55,
        }
    }
}

impl fmt::Display for FontFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Width and height of a measured box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeasureError {
    #[error("Timed out after {secs}s loading image {src}")]
    Timeout { src: String, secs: u64 },
    #[error("Failed to load image {src}: {reason}")]
    Failure { src: String, reason: String },
}

/// Measures the rendered extent of a node's title with its subtitle below.
/// Implementations must use the metrics the canvas renderer uses.
pub trait TextMeasurer {
    fn measure_text(&self, title: &str, subtitle: &str, size: SizeStyle, font: FontFamily)
    -> Extent;
}

/// Loads an image (vault resource or external URL) for its natural size.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load_image(&self, src: &str) -> Result<ImageDimensions, MeasureError>;
}

/// Character-width based text measurement. Wide (CJK) characters count as
/// two cells.
#[derive(Debug, Clone)]
pub struct TextMetrics {
    pub line_height_ratio: f64,
    /// Subtitle font size relative to the title's.
    pub subtitle_scale: f64,
    pub padding_x: f64,
    pub padding_y: f64,
    pub subtitle_gap: f64,
    /// Titles wrap once a line would exceed this width.
    pub max_text_width: f64,
    pub min_node_width: f64,
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self {
            line_height_ratio: 1.35,
            subtitle_scale: 0.75,
            padding_x: 16.0,
            padding_y: 12.0,
            subtitle_gap: 4.0,
            max_text_width: 400.0,
            min_node_width: 160.0,
        }
    }
}

impl TextMetrics {
    pub fn text_width(&self, text: &str, font_size: f64, font: FontFamily) -> f64 {
        let width = UnicodeWidthStr::width(text);
        width as f64 * font_size * font.char_width_ratio()
    }

    /// Greedy word wrap. Words wider than the limit get a line of their own.
    pub fn wrap_lines<'t>(&self, text: &'t str, font_size: f64, font: FontFamily) -> Vec<&'t str> {
        let mut lines = Vec::new();
        let mut line_start: Option<usize> = None;
        let mut line_end = 0;

        for (start, word) in word_spans(text) {
            let end = start + word.len();
            match line_start {
                None => line_start = Some(start),
                Some(ls) => {
                    if self.text_width(&text[ls..end], font_size, font) > self.max_text_width {
                        lines.push(&text[ls..line_end]);
                        line_start = Some(start);
                    }
                }
            }
            line_end = end;
        }
        if let Some(ls) = line_start {
            lines.push(&text[ls..line_end]);
        }
        lines
    }
}

fn word_spans(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_whitespace()
        .map(move |word| (word.as_ptr() as usize - text.as_ptr() as usize, word))
}

impl TextMeasurer for TextMetrics {
    fn measure_text(
        &self,
        title: &str,
        subtitle: &str,
        size: SizeStyle,
        font: FontFamily,
    ) -> Extent {
        let title_size = size.font_size();
        let subtitle_size = title_size * self.subtitle_scale;

        let lines = self.wrap_lines(title, title_size, font);
        let title_width = lines
            .iter()
            .map(|line| self.text_width(line, title_size, font))
            .fold(0.0, f64::max);
        let subtitle_width = self.text_width(subtitle, subtitle_size, font);

        let content_width = title_width.max(subtitle_width) + self.padding_x * 2.0;
        let w = content_width.max(self.min_node_width);

        let title_height = lines.len().max(1) as f64 * title_size * self.line_height_ratio;
        let subtitle_height = if subtitle.is_empty() {
            0.0
        } else {
            self.subtitle_gap + subtitle_size * self.line_height_ratio
        };
        let h = title_height + subtitle_height + self.padding_y * 2.0;

        Extent { w, h }
    }
}

/// Image loader that reports fixed dimensions for every source, or fails
/// when none are configured.
#[derive(Debug, Clone, Default)]
pub struct FixedImageLoader {
    pub dimensions: Option<ImageDimensions>,
}

impl FixedImageLoader {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            dimensions: Some(ImageDimensions { width, height }),
        }
    }
}

#[async_trait]
impl ImageLoader for FixedImageLoader {
    async fn load_image(&self, src: &str) -> Result<ImageDimensions, MeasureError> {
        self.dimensions.ok_or_else(|| MeasureError::Failure {
            src: src.to_string(),
            reason: "no image dimensions available".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_width() {
        let m = TextMetrics::default();
        assert_eq!(m.text_width("User", 10.0, FontFamily::Mono), 4.0 * 6.0);
    }

    #[test]
    fn test_unicode_width() {
        let m = TextMetrics::default();
        // Full-width characters take two cells
        assert_eq!(m.text_width("ユーザー", 10.0, FontFamily::Mono), 8.0 * 6.0);
    }

    #[test]
    fn test_mixed_width() {
        let m = TextMetrics::default();
        // "User" (4) + "テスト" (6) = 10
        assert_eq!(m.text_width("Userテスト", 10.0, FontFamily::Draw), 10.0 * 6.0);
    }

    #[test]
    fn test_wrap_lines() {
        let m = TextMetrics {
            max_text_width: 60.0,
            ..TextMetrics::default()
        };
        // 10 units per cell, so at most 6 cells per line
        let lines = m.wrap_lines("ab cd  ef verylongword g", 10.0 / 0.6, FontFamily::Mono);
        assert_eq!(lines, vec!["ab cd", "ef", "verylongword", "g"]);
        assert!(m.wrap_lines("   ", 18.0, FontFamily::Mono).is_empty());
    }

    #[test]
    fn test_measure_grows_with_lines() {
        let m = TextMetrics::default();
        let short = m.measure_text("Claim", "Claim", SizeStyle::S, FontFamily::Draw);
        let long_title = "word ".repeat(80);
        let long = m.measure_text(&long_title, "Claim", SizeStyle::S, FontFamily::Draw);

        assert_eq!(short.w, m.min_node_width);
        assert!(long.h > short.h);
        assert!(long.w <= m.max_text_width + m.padding_x * 2.0);
    }

    #[test]
    fn test_measure_size_style_scales() {
        let m = TextMetrics::default();
        let title = "A reasonably long claim title";
        let s = m.measure_text(title, "Claim", SizeStyle::S, FontFamily::Sans);
        let xl = m.measure_text(title, "Claim", SizeStyle::Xl, FontFamily::Sans);
        assert!(xl.w > s.w);
        assert!(xl.h > s.h);
    }

    #[test]
    fn test_style_names() {
        assert_eq!(SizeStyle::from_str("xl"), Some(SizeStyle::Xl));
        assert_eq!(SizeStyle::from_str("huge"), None);
        assert_eq!(FontFamily::from_str("serif"), Some(FontFamily::Serif));
        assert_eq!(FontFamily::Draw.to_string(), "draw");
        assert_eq!(serde_json::to_string(&SizeStyle::Xl).unwrap(), "\"xl\"");
    }

    #[tokio::test]
    async fn test_fixed_image_loader() {
        let loader = FixedImageLoader::new(400.0, 200.0);
        let dims = loader.load_image("cover.png").await.unwrap();
        assert_eq!(dims.width, 400.0);

        let err = FixedImageLoader::default().load_image("cover.png").await.unwrap_err();
        assert!(matches!(err, MeasureError::Failure { .. }));
    }
}
