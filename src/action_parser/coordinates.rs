//! Box parsing and coordinate normalization.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ActionParserConfig, ModelVersion};

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-?\d+(?:\.\d+)?").expect("box number regex must compile")
});

/// Size of the screenshot the model looked at, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenContext {
    pub width: u32,
    pub height: u32,
}

impl ScreenContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn is_known(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Pixel budget used by the v1.5 smart-resize preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartResizeConfig {
    pub factor: u32,
    pub min_pixels: u64,
    pub max_pixels: u64,
    pub max_ratio: f64,
}

impl Default for SmartResizeConfig {
    fn default() -> Self {
        Self {
            factor: 28,
            min_pixels: 100 * 28 * 28,
            max_pixels: 16384 * 28 * 28,
            max_ratio: 200.0,
        }
    }
}

/// Dimensions `(height, width)` the model saw after smart resize.
///
/// Returns `None` (and logs) when the aspect ratio exceeds `max_ratio`.
pub fn smart_resize(height: u32, width: u32, config: &SmartResizeConfig) -> Option<(u32, u32)> {
    if height == 0 || width == 0 || config.factor == 0 {
        return None;
    }
    let (h, w) = (f64::from(height), f64::from(width));
    let factor = f64::from(config.factor);

    let ratio = h.max(w) / h.min(w);
    if ratio > config.max_ratio {
        tracing::warn!(
            height,
            width,
            ratio,
            max_ratio = config.max_ratio,
            "aspect ratio too large for smart resize"
        );
        return None;
    }

    let mut h_bar = factor.max(round_by(h, factor));
    let mut w_bar = factor.max(round_by(w, factor));
    let (min_pixels, max_pixels) = (config.min_pixels as f64, config.max_pixels as f64);
    if h_bar * w_bar > max_pixels {
        let beta = (h * w / max_pixels).sqrt();
        h_bar = factor.max(floor_by(h / beta, factor));
        w_bar = factor.max(floor_by(w / beta, factor));
    } else if h_bar * w_bar < min_pixels {
        let beta = (min_pixels / (h * w)).sqrt();
        h_bar = ceil_by(h * beta, factor);
        w_bar = ceil_by(w * beta, factor);
    }
    Some((h_bar as u32, w_bar as u32))
}

fn round_by(value: f64, factor: f64) -> f64 {
    (value / factor).round() * factor
}

fn floor_by(value: f64, factor: f64) -> f64 {
    (value / factor).floor() * factor
}

fn ceil_by(value: f64, factor: f64) -> f64 {
    (value / factor).ceil() * factor
}

/// How raw model coordinates map into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateSpace {
    /// Coordinates are scaled by the configured `[width, height]` factors.
    Factors([f64; 2]),
    /// Coordinates are pixels of the smart-resized image `[width, height]`.
    SmartResized([f64; 2]),
}

impl CoordinateSpace {
    /// Select the space for a model version and screen.
    pub fn resolve(config: &ActionParserConfig, screen: Option<ScreenContext>) -> Self {
        let factors = config.factors;
        match (config.model_version, screen.filter(ScreenContext::is_known)) {
            (ModelVersion::V1_5, Some(screen)) => {
                match smart_resize(screen.height, screen.width, &config.smart_resize) {
                    Some((h_bar, w_bar)) => Self::SmartResized([f64::from(w_bar), f64::from(h_bar)]),
                    None => Self::Factors(factors),
                }
            }
            _ => Self::Factors(factors),
        }
    }
}

/// A normalized box plus its on-screen midpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBox {
    /// `[x1, y1, x2, y2]` in `[0, 1]`; points are duplicated.
    pub coords: Vec<f64>,
    pub pixel_center: Option<[f64; 2]>,
}

impl NormalizedBox {
    /// Compact JSON array text, e.g. `[0.5,0.5,0.5,0.5]`.
    pub fn to_json_string(&self) -> String {
        let items: Vec<String> = self.coords.iter().map(f64::to_string).collect();
        format!("[{}]", items.join(","))
    }
}

/// Normalizes box strings for one parsed response.
#[derive(Debug, Clone)]
pub struct BoxNormalizer {
    factors: [f64; 2],
    space: CoordinateSpace,
    screen: Option<ScreenContext>,
    scale_factor: f64,
}

impl BoxNormalizer {
    pub fn new(config: &ActionParserConfig, screen: Option<ScreenContext>) -> Self {
        Self {
            factors: config.factors,
            space: CoordinateSpace::resolve(config, screen),
            screen: screen.filter(ScreenContext::is_known),
            scale_factor: config.scale_factor,
        }
    }

    pub fn space(&self) -> CoordinateSpace {
        self.space
    }

    /// Normalize `(x,y)`, `(x1,y1)(x2,y2)` or `(x1,y1,x2,y2)` text.
    ///
    /// Returns `None` when the text does not hold two or four numbers.
    pub fn normalize(&self, raw: &str) -> Option<NormalizedBox> {
        let numbers: Vec<f64> = NUMBER_RE
            .find_iter(raw)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        if numbers.len() != 2 && numbers.len() != 4 {
            tracing::warn!(raw, count = numbers.len(), "box does not hold 2 or 4 numbers");
            return None;
        }

        let divisors = self.divisors(&numbers);
        let mut coords: Vec<f64> = numbers
            .iter()
            .enumerate()
            .map(|(index, value)| value / divisors[index % 2])
            .collect();
        if coords.len() == 2 {
            coords.extend_from_slice(&[coords[0], coords[1]]);
        }

        let pixel_center = self.screen.map(|screen| {
            let [width_factor, height_factor] = self.factors;
            let x = (coords[0] + coords[2]) / 2.0;
            let y = (coords[1] + coords[3]) / 2.0;
            [
                (x * f64::from(screen.width) * width_factor).round() / width_factor
                    * self.scale_factor,
                (y * f64::from(screen.height) * height_factor).round() / height_factor
                    * self.scale_factor,
            ]
        });

        Some(NormalizedBox {
            coords,
            pixel_center,
        })
    }

    // Values above the axis factor are read as absolute pixels. This is a
    // best-effort guess and is ambiguous for small screens or factors.
    fn divisors(&self, numbers: &[f64]) -> [f64; 2] {
        match self.space {
            CoordinateSpace::SmartResized(size) => size,
            CoordinateSpace::Factors(factors) => match self.screen {
                Some(screen)
                    if numbers
                        .iter()
                        .enumerate()
                        .any(|(index, value)| *value > factors[index % 2]) =>
                {
                    [f64::from(screen.width), f64::from(screen.height)]
                }
                _ => factors,
            },
        }
    }
}
