//! Generator configuration, loaded from a JSON file with every field defaulted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::collab::CommandTemplate;
use crate::foundation::core::{Dims, Fps, RenderSpec};
use crate::foundation::error::{ReelError, ReelResult};
use crate::pad::PadOptions;

/// External programs backing the bundled collaborator adapters.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandsConfig {
    /// Post image renderer, see [`crate::collab::CommandImageRenderer`].
    pub render_image: Option<CommandTemplate>,
    /// Text-to-speech program, see [`crate::collab::CommandNarrator`].
    pub narrate: Option<CommandTemplate>,
    /// Metadata generator, see [`crate::collab::CommandMetadataService`].
    pub metadata: Option<CommandTemplate>,
}

/// Everything a [`crate::pipeline::Generator`] needs besides its collaborators.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Final canvas size.
    pub canvas: Dims,
    /// Fraction of the canvas height given to the scrolling post.
    pub split_ratio: f64,
    /// Frame rate of the scroll video and the motion clip.
    pub fps: u32,
    /// Background pad tuning.
    pub pad: PadOptions,
    /// Random draws before content selection gives up.
    pub select_attempts: u32,
    /// Rendered post images taller than this are ineligible.
    pub max_image_height: Option<u32>,
    /// Narration voice identifier.
    pub voice: String,
    /// Directory of scraped post JSON files.
    pub content_dir: PathBuf,
    /// Directory of long motion clips.
    pub clip_dir: PathBuf,
    /// Parent of the per-run scratch directories.
    pub work_dir: PathBuf,
    /// Where finished `video_<n>` directories are placed.
    pub output_dir: PathBuf,
    /// Usage ledger file.
    pub ledger_path: PathBuf,
    /// Metadata generation attempts before a run is aborted.
    pub metadata_attempts: u32,
    /// Consecutive failed runs that trigger a backoff pause.
    pub failure_backoff_after: u32,
    /// Length of the backoff pause in seconds.
    pub failure_backoff_secs: f64,
    /// External programs for the bundled adapters.
    pub commands: CommandsConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            canvas: Dims {
                width: 1080,
                height: 1920,
            },
            split_ratio: 0.5,
            fps: 30,
            pad: PadOptions::default(),
            select_attempts: 5000,
            max_image_height: None,
            voice: "jf_alpha".to_string(),
            content_dir: PathBuf::from("reddit_data"),
            clip_dir: PathBuf::from("clips"),
            work_dir: PathBuf::from("temp"),
            output_dir: PathBuf::from("final_vids"),
            ledger_path: PathBuf::from("usage_ledger.txt"),
            metadata_attempts: 3,
            failure_backoff_after: 10,
            failure_backoff_secs: 30.0,
            commands: CommandsConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> ReelResult<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_slice(&bytes)
            .map_err(|e| ReelError::validation(format!("invalid config '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check ranges and cross-field constraints.
    pub fn validate(&self) -> ReelResult<()> {
        self.render_spec(1.0).validate()?;
        self.frame_rate()?;
        if self.canvas.width <= self.pad.margin_px.saturating_mul(2) {
            return Err(ReelError::validation(format!(
                "pad margin {}px leaves no room in a {} canvas",
                self.pad.margin_px, self.canvas
            )));
        }
        if !self.pad.duration_tolerance_secs.is_finite() || self.pad.duration_tolerance_secs < 0.0
        {
            return Err(ReelError::validation(
                "pad duration tolerance must be a non-negative number of seconds",
            ));
        }
        if self.select_attempts == 0 {
            return Err(ReelError::validation("select_attempts must be > 0"));
        }
        if self.metadata_attempts == 0 {
            return Err(ReelError::validation("metadata_attempts must be > 0"));
        }
        if self.max_image_height == Some(0) {
            return Err(ReelError::validation("max_image_height must be > 0 when set"));
        }
        if self.voice.trim().is_empty() {
            return Err(ReelError::validation("voice must not be empty"));
        }
        if Duration::try_from_secs_f64(self.failure_backoff_secs).is_err() {
            return Err(ReelError::validation(format!(
                "failure_backoff_secs must be a non-negative duration, got {}",
                self.failure_backoff_secs
            )));
        }
        Ok(())
    }

    /// Output frame rate.
    pub fn frame_rate(&self) -> ReelResult<Fps> {
        Fps::new(self.fps, 1)
    }

    /// Geometry and timing for a video lasting `duration_secs`.
    pub fn render_spec(&self, duration_secs: f64) -> RenderSpec {
        RenderSpec {
            canvas: self.canvas,
            duration_secs,
            split_ratio: self.split_ratio,
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
