use crate::foundation::error::{ReelError, ReelResult};

/// Absolute 0-based frame index within one encoded stream.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> ReelResult<Self> {
        if den == 0 {
            return Err(ReelError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ReelError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Parse an ffprobe-style rate such as `30/1`, `30000/1001` or `25`.
    pub fn parse(rate: &str) -> ReelResult<Self> {
        let rate = rate.trim();
        let (num, den) = match rate.split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (rate, "1"),
        };
        let num = num
            .parse::<u32>()
            .map_err(|e| ReelError::validation(format!("invalid frame rate '{rate}': {e}")))?;
        let den = den
            .parse::<u32>()
            .map_err(|e| ReelError::validation(format!("invalid frame rate '{rate}': {e}")))?;
        Self::new(num, den)
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Convert frame count to seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    /// Convert seconds to frame count using ceil semantics.
    ///
    /// A tiny tolerance absorbs float noise so that e.g. `2.0s @ 30fps` is 60 frames, not 61.
    pub fn secs_to_frames_ceil(self, secs: f64) -> u64 {
        let exact = secs * self.as_f64();
        (exact - 1e-9).ceil().max(0.0) as u64
    }

    /// Convert seconds to frame count using floor semantics.
    pub fn secs_to_frames_floor(self, secs: f64) -> u64 {
        (secs * self.as_f64() + 1e-9).floor().max(0.0) as u64
    }
}

impl std::fmt::Display for Fps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Pixel dimensions of a frame or canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Dims {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dims {
    /// Create validated, non-zero dimensions.
    pub fn new(width: u32, height: u32) -> ReelResult<Self> {
        if width == 0 || height == 0 {
            return Err(ReelError::validation(format!(
                "dimensions must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Whether both sides are even (required by 4:2:0 chroma subsampling).
    pub fn is_even(self) -> bool {
        self.width.is_multiple_of(2) && self.height.is_multiple_of(2)
    }
}

impl std::fmt::Display for Dims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Geometry and timing of one generated video.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderSpec {
    /// Final canvas size.
    pub canvas: Dims,
    /// Target duration in seconds (the narration length).
    pub duration_secs: f64,
    /// Fraction of the canvas height given to the scrolling content band.
    pub split_ratio: f64,
}

impl RenderSpec {
    /// Validate ranges.
    pub fn validate(&self) -> ReelResult<()> {
        Dims::new(self.canvas.width, self.canvas.height)?;
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(ReelError::validation(format!(
                "render duration must be a positive number of seconds, got {}",
                self.duration_secs
            )));
        }
        if !(self.split_ratio > 0.0 && self.split_ratio < 1.0) {
            return Err(ReelError::validation(format!(
                "split ratio must be within (0, 1), got {}",
                self.split_ratio
            )));
        }
        Ok(())
    }

    /// Height of the scrolling content band (top).
    pub fn content_band_height(&self) -> u32 {
        let h = (f64::from(self.canvas.height) * self.split_ratio).round() as u32;
        h.clamp(1, self.canvas.height.saturating_sub(1).max(1))
    }

    /// Size of the secondary motion band (bottom).
    pub fn motion_band(&self) -> Dims {
        Dims {
            width: self.canvas.width,
            height: self
                .canvas
                .height
                .saturating_sub(self.content_band_height())
                .max(1),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
