//! Per-pixel classification rules
//!
//! Every rule looks at a single pixel: its RGB channels, its coordinates and the
//! image dimensions. Detection rules mark a pixel as background; protection rules
//! can only clear that mark. Protections always run after all detections.

use serde::{Deserialize, Serialize};

/// Sensitivity-derived thresholds shared by every pixel of one pass
///
/// The thresholds are linear in sensitivity. Values outside 0-100 extrapolate the
/// same formulas; nothing here clamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum brightness for the solid-background rule
    pub brightness: f64,
    /// Maximum color variance for the solid-background rule
    pub variance: f64,
    /// Per-channel minimum for the near-white rule
    pub white: f64,
    /// Maximum brightness for the near-dark rule
    pub dark: f64,
    /// Minimum brightness for the edge-proximity rule
    pub edge: f64,
}

impl Thresholds {
    /// Derive all thresholds from a sensitivity value
    #[must_use]
    pub fn from_sensitivity(sensitivity: f32) -> Self {
        let s = f64::from(sensitivity);
        Self {
            brightness: 180.0 - s * 0.8,
            variance: 30.0 + s * 0.4,
            white: 240.0 - s * 0.2,
            dark: 50.0 + s * 0.3,
            edge: 150.0 - s * 0.3,
        }
    }
}

/// Brightness and color variance of one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelFeatures {
    /// Arithmetic mean of R, G and B
    pub brightness: f64,
    /// Root-mean-square deviation of R, G and B from their mean
    pub color_variance: f64,
}

impl PixelFeatures {
    #[must_use]
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
        let brightness = (r + g + b) / 3.0;
        let sum_of_squares =
            (r - brightness).powi(2) + (g - brightness).powi(2) + (b - brightness).powi(2);

        Self {
            brightness,
            color_variance: (sum_of_squares / 3.0).sqrt(),
        }
    }
}

/// Tunable constants used by the rules
///
/// The defaults reproduce the reference classifier. The high-detail limit and the
/// solid-background variance threshold overlap for some sensitivities; protections
/// win in that case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConstants {
    /// Width of the border band checked by the edge-proximity rule (pixels)
    pub edge_band: u32,
    /// Added to the variance threshold inside the border band
    pub edge_variance_margin: f64,
    /// Maximum color variance for the near-dark rule
    pub dark_variance_limit: f64,
    /// Color variance above which a pixel is always kept
    pub high_detail_variance: f64,
    /// Minimum R-G and G-B gap for the skin-tone protection
    pub skin_channel_gap: i16,
}

impl Default for RuleConstants {
    fn default() -> Self {
        Self {
            edge_band: 10,
            edge_variance_margin: 10.0,
            dark_variance_limit: 20.0,
            high_detail_variance: 60.0,
            skin_channel_gap: 15,
        }
    }
}

/// Everything a rule may look at for one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelContext {
    pub rgb: [u8; 3],
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub features: PixelFeatures,
}

impl PixelContext {
    #[must_use]
    pub fn new(rgb: [u8; 3], x: u32, y: u32, width: u32, height: u32) -> Self {
        let [r, g, b] = rgb;
        Self {
            rgb,
            x,
            y,
            width,
            height,
            features: PixelFeatures::from_rgb(r, g, b),
        }
    }

    /// Whether the pixel lies inside the border band
    ///
    /// Uses signed arithmetic so images narrower than the band are covered entirely.
    #[must_use]
    pub fn is_near_border(&self, band: u32) -> bool {
        let band = i64::from(band);
        let (x, y) = (i64::from(self.x), i64::from(self.y));
        let (width, height) = (i64::from(self.width), i64::from(self.height));

        x < band || x > width - band || y < band || y > height - band
    }
}

/// Whether a rule detects background or protects foreground
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Detection,
    Protection,
}

/// Classification rules as tagged variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rule {
    /// Bright, low-variance pixel
    SolidBackground,
    /// All channels above the white threshold
    NearWhite,
    /// Dark, low-variance pixel
    NearDark,
    /// Bright, low-variance pixel close to the image border
    EdgeProximity,
    /// Warm pixel with R > G > B in skin-like ranges
    SkinTone,
    /// Highly saturated or busy pixel
    HighDetail,
}

impl Rule {
    /// Detection rules in evaluation order
    pub const DETECTIONS: [Rule; 4] = [
        Rule::SolidBackground,
        Rule::NearWhite,
        Rule::NearDark,
        Rule::EdgeProximity,
    ];

    /// Protection rules in evaluation order
    pub const PROTECTIONS: [Rule; 2] = [Rule::SkinTone, Rule::HighDetail];

    #[must_use]
    pub fn kind(self) -> RuleKind {
        match self {
            Rule::SolidBackground | Rule::NearWhite | Rule::NearDark | Rule::EdgeProximity => {
                RuleKind::Detection
            },
            Rule::SkinTone | Rule::HighDetail => RuleKind::Protection,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Rule::SolidBackground => "solid-background",
            Rule::NearWhite => "near-white",
            Rule::NearDark => "near-dark",
            Rule::EdgeProximity => "edge-proximity",
            Rule::SkinTone => "skin-tone",
            Rule::HighDetail => "high-detail",
        }
    }

    /// Evaluate this rule alone for one pixel
    #[must_use]
    pub fn matches(
        self,
        pixel: &PixelContext,
        thresholds: &Thresholds,
        constants: &RuleConstants,
    ) -> bool {
        let PixelFeatures {
            brightness,
            color_variance,
        } = pixel.features;
        let [r, g, b] = pixel.rgb;

        match self {
            Rule::SolidBackground => {
                brightness > thresholds.brightness && color_variance < thresholds.variance
            },
            Rule::NearWhite => {
                let white = thresholds.white;
                f64::from(r) > white && f64::from(g) > white && f64::from(b) > white
            },
            Rule::NearDark => {
                brightness < thresholds.dark && color_variance < constants.dark_variance_limit
            },
            Rule::EdgeProximity => {
                pixel.is_near_border(constants.edge_band)
                    && brightness > thresholds.edge
                    && color_variance < thresholds.variance + constants.edge_variance_margin
            },
            Rule::SkinTone => {
                let (r, g, b) = (i16::from(r), i16::from(g), i16::from(b));
                let gap = constants.skin_channel_gap;

                (96..255).contains(&r)
                    && (41..200).contains(&g)
                    && (21..150).contains(&b)
                    && r > g
                    && g > b
                    && r - g > gap
                    && g - b > gap
            },
            Rule::HighDetail => color_variance > constants.high_detail_variance,
        }
    }
}

/// Materialised classification of one pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Final decision after protections
    pub is_background: bool,
    /// First detection rule that fired
    pub detected_by: Option<Rule>,
    /// Protection rule that cleared the detection
    pub protected_by: Option<Rule>,
}

/// Run every detection, then every protection, for one pixel
///
/// Protections are only consulted when a detection fired, since they can only
/// clear the flag.
#[must_use]
pub fn classify(
    pixel: &PixelContext,
    thresholds: &Thresholds,
    constants: &RuleConstants,
) -> Classification {
    let detected_by = Rule::DETECTIONS
        .into_iter()
        .find(|rule| rule.matches(pixel, thresholds, constants));

    let protected_by = detected_by.and_then(|_| {
        Rule::PROTECTIONS
            .into_iter()
            .find(|rule| rule.matches(pixel, thresholds, constants))
    });

    Classification {
        is_background: detected_by.is_some() && protected_by.is_none(),
        detected_by,
        protected_by,
    }
}
