//! Pipeline orchestrator: one generation run as a sequence of stages, and the supervisor
//! loop that keeps runs going unattended.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::SeedableRng as _;
use rand::rngs::StdRng;

use crate::audio_sync::sync_audio;
use crate::collab::{
    ClipRequest, ContentStore, ImageRenderer, Metadata, MetadataService, MotionSource,
    NarrationService,
};
use crate::config::GeneratorConfig;
use crate::foundation::core::Fps;
use crate::foundation::error::{ReelError, ReelResult};
use crate::ledger::UsageLedger;
use crate::media::probe::MediaAsset;
use crate::pad::composite_with_background;
use crate::scroll::{ScrollParams, fit_width, load_image, render_scroll_image};
use crate::stack::stack_vertically;

mod persist;
mod scratch;
mod select;

pub use persist::{
    METADATA_FILE, UNPUBLISHED_DIR, VIDEO_FILE, keep_unpublished, next_output_index,
    persist_output,
};
pub use scratch::{DeferredDeletions, ScratchDir, remove_forcefully};
pub use select::{Selection, SelectionPolicy, image_fits, select_content};

/// Stages of one run, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Scratch directory setup and deferred cleanup.
    Prepare,
    /// Random draw of an unused, renderable content item.
    SelectContent,
    /// Text-to-speech of the selected item.
    Narrate,
    /// Still image to scrolling video.
    RenderScroll,
    /// Motion clip for the bottom band.
    ObtainSecondaryClip,
    /// Scroll video over motion clip.
    Stack,
    /// Blurred background fill.
    PadBackground,
    /// Narration muxed under the picture.
    SyncAudio,
    /// Title and description generation.
    GenerateMetadata,
    /// Atomic move into the output directory.
    PersistOutput,
}

impl Stage {
    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::SelectContent => "select_content",
            Self::Narrate => "narrate",
            Self::RenderScroll => "render_scroll",
            Self::ObtainSecondaryClip => "obtain_secondary_clip",
            Self::Stack => "stack",
            Self::PadBackground => "pad_background",
            Self::SyncAudio => "sync_audio",
            Self::GenerateMetadata => "generate_metadata",
            Self::PersistOutput => "persist_output",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one run.
#[derive(Debug)]
pub enum RunOutcome {
    /// Output persisted and ledger updated.
    Success {
        /// The new `video_<n>` directory.
        output: PathBuf,
        /// Identifier of the content item used.
        content_id: String,
    },
    /// A stage failed or panicked; the run's intermediates were removed.
    Aborted {
        /// Stage that failed.
        stage: Stage,
        /// Failure cause.
        error: ReelError,
    },
}

impl RunOutcome {
    /// Whether the run produced an output.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Counters kept by [`Generator::run_loop`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Runs started.
    pub attempted: u64,
    /// Runs that persisted an output.
    pub succeeded: u64,
    /// Runs that aborted.
    pub failed: u64,
    /// Aborted runs since the last success.
    pub consecutive_failures: u64,
    /// Aborted runs per failing stage.
    pub failures_by_stage: BTreeMap<Stage, u64>,
    /// Aborted runs per error kind, see [`ReelError::kind`].
    pub failures_by_kind: BTreeMap<&'static str, u64>,
}

impl LoopStats {
    /// Account for one finished run.
    pub fn record(&mut self, outcome: &RunOutcome) {
        self.attempted += 1;
        match outcome {
            RunOutcome::Success { .. } => {
                self.succeeded += 1;
                self.consecutive_failures = 0;
            }
            RunOutcome::Aborted { stage, error } => {
                self.failed += 1;
                self.consecutive_failures += 1;
                *self.failures_by_stage.entry(*stage).or_default() += 1;
                *self.failures_by_kind.entry(error.kind()).or_default() += 1;
            }
        }
    }
}

/// The external services a [`Generator`] drives.
pub struct Collaborators {
    /// Content item source.
    pub content: Box<dyn ContentStore>,
    /// Post image renderer.
    pub renderer: Box<dyn ImageRenderer>,
    /// Text-to-speech.
    pub narrator: Box<dyn NarrationService>,
    /// Motion clip source.
    pub motion: Box<dyn MotionSource>,
    /// Title/description generator.
    pub metadata: Box<dyn MetadataService>,
}

/// Drives generation runs.
pub struct Generator {
    config: GeneratorConfig,
    collab: Collaborators,
    ledger: UsageLedger,
    rng: StdRng,
    deferred: DeferredDeletions,
    stats: LoopStats,
}

struct Produced {
    video: MediaAsset,
    narration_text: String,
    content_id: String,
}

impl Generator {
    /// Validate `config`, open the ledger, and seed randomness from OS entropy.
    pub fn new(config: GeneratorConfig, collab: Collaborators) -> ReelResult<Self> {
        config.validate()?;
        let ledger = UsageLedger::open(&config.ledger_path)?;
        Ok(Self {
            config,
            collab,
            ledger,
            rng: StdRng::from_entropy(),
            deferred: DeferredDeletions::default(),
            stats: LoopStats::default(),
        })
    }

    /// Make content selection deterministic.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Usage ledger shared by every run.
    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Counters accumulated by [`Generator::run_loop`].
    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Deletions still waiting to be retried.
    pub fn pending_deletions(&self) -> usize {
        self.deferred.len()
    }

    /// Run generation repeatedly, `max_runs` times or forever when `None`.
    ///
    /// No run failure escapes. After every `failure_backoff_after` consecutive failures a
    /// systemic-failure warning is logged and the loop pauses for `failure_backoff_secs`.
    pub fn run_loop(&mut self, max_runs: Option<u64>) -> &LoopStats {
        let mut runs = 0u64;
        while max_runs.is_none_or(|max| runs < max) {
            runs += 1;
            let outcome = self.run_once();
            self.stats.record(&outcome);

            match &outcome {
                RunOutcome::Success { output, .. } => tracing::info!(
                    output = %output.display(),
                    succeeded = self.stats.succeeded,
                    failed = self.stats.failed,
                    "run succeeded"
                ),
                RunOutcome::Aborted { stage, error } => tracing::warn!(
                    %stage,
                    kind = error.kind(),
                    error = %error,
                    consecutive = self.stats.consecutive_failures,
                    "run aborted"
                ),
            }

            let after = u64::from(self.config.failure_backoff_after);
            let streak = self.stats.consecutive_failures;
            if after > 0 && streak > 0 && streak.is_multiple_of(after) {
                tracing::warn!(
                    consecutive = streak,
                    attempted = self.stats.attempted,
                    succeeded = self.stats.succeeded,
                    by_stage = ?self.stats.failures_by_stage,
                    "every recent run failed; backing off"
                );
                if max_runs.is_none_or(|max| runs < max) {
                    std::thread::sleep(
                        Duration::try_from_secs_f64(self.config.failure_backoff_secs)
                            .unwrap_or(Duration::MAX),
                    );
                }
            }
        }
        &self.stats
    }

    /// Execute one run end to end. Every error is captured in the returned outcome and the
    /// run's scratch directory is removed either way.
    #[tracing::instrument(skip(self))]
    pub fn run_once(&mut self) -> RunOutcome {
        if !self.deferred.is_empty() {
            let remaining = self.deferred.retry();
            tracing::debug!(remaining, "retried deferred deletions");
        }

        let scratch = match ScratchDir::create(&self.config.work_dir) {
            Ok(s) => s,
            Err(error) => {
                return RunOutcome::Aborted {
                    stage: Stage::Prepare,
                    error,
                };
            }
        };
        let run_id = scratch
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut stage = Stage::SelectContent;
        // A panicking collaborator fails this run only; `stage` still names where it happened.
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.produce(&scratch, &mut stage).and_then(|produced| {
                stage = Stage::GenerateMetadata;
                let metadata = match self.generate_metadata(&produced.narration_text) {
                    Ok(metadata) => metadata,
                    Err(error) => {
                        self.shelve_video(&run_id, &produced.video.path);
                        return Err(error);
                    }
                };
                stage = Stage::PersistOutput;
                let output = persist_output(
                    &self.config.output_dir,
                    &run_id,
                    &produced.video.path,
                    &metadata,
                )?;
                Ok((output, produced.content_id))
            })
        }))
        .unwrap_or_else(|payload| Err(panic_error(payload.as_ref())));

        scratch.cleanup(&mut self.deferred);
        match result {
            Ok((output, content_id)) => RunOutcome::Success { output, content_id },
            Err(error) => RunOutcome::Aborted { stage, error },
        }
    }

    fn shelve_video(&self, run_id: &str, video: &Path) {
        match keep_unpublished(&self.config.output_dir, run_id, video) {
            Ok(path) => tracing::warn!(
                path = %path.display(),
                "no usable metadata; kept the rendered video unpublished"
            ),
            Err(e) => tracing::warn!(error = %e, "no usable metadata and the video could not be kept"),
        }
    }

    fn produce(&mut self, scratch: &ScratchDir, stage: &mut Stage) -> ReelResult<Produced> {
        let cfg = &self.config;
        let fps = cfg.frame_rate()?;

        *stage = Stage::SelectContent;
        let items = self.collab.content.list_items()?;
        let max_height = cfg.max_image_height;
        let selection = select_content(
            &items,
            &self.ledger,
            self.collab.renderer.as_ref(),
            SelectionPolicy {
                max_attempts: cfg.select_attempts,
                target_width: cfg.canvas.width,
            },
            scratch.path(),
            &mut self.rng,
            |path| image_fits(path, max_height),
        )?;

        *stage = Stage::Narrate;
        let narration_text = selection.item.narration_text();
        let narration = self
            .collab
            .narrator
            .narrate(&cfg.voice, &narration_text, scratch.path())?;
        let spec = cfg.render_spec(narration.duration_secs);
        spec.validate()?;
        tracing::info!(
            id = %selection.item.id,
            duration_secs = narration.duration_secs,
            "narrated content"
        );

        *stage = Stage::RenderScroll;
        let image = fit_width(load_image(&selection.image_path)?, spec.canvas.width);
        let params = ScrollParams {
            fps,
            ..ScrollParams::new(narration.duration_secs, spec.content_band_height())
        };
        let scroll = render_scroll_image(&image, &params, &scratch.join("scroll.mp4"))?;

        *stage = Stage::ObtainSecondaryClip;
        let mut request = ClipRequest {
            duration_secs: narration.duration_secs,
            dims: spec.motion_band(),
            fps,
        };
        let clip = self
            .collab
            .motion
            .fetch_clip(&request, &scratch.join("motion.mp4"))?;

        *stage = Stage::Stack;
        let stacked = stack_vertically(&scroll.path, &clip.path, &scratch.join("stacked.mp4"))?;

        *stage = Stage::PadBackground;
        let background = self.equalize_background(clip, &stacked, &mut request, scratch, fps)?;
        let padded = composite_with_background(
            &stacked.path,
            &background.path,
            &cfg.pad,
            &scratch.join("padded.mp4"),
        )?;

        *stage = Stage::SyncAudio;
        let video = sync_audio(&padded.path, &narration.audio_path, &scratch.join("final.mp4"))?;

        Ok(Produced {
            video,
            narration_text,
            content_id: selection.item.id,
        })
    }

    // The pad compositor requires equal durations; the stacked video ends with the shorter
    // input, so re-request the clip at exactly that length when the two drifted apart.
    fn equalize_background(
        &self,
        clip: MediaAsset,
        stacked: &MediaAsset,
        request: &mut ClipRequest,
        scratch: &ScratchDir,
        fps: Fps,
    ) -> ReelResult<MediaAsset> {
        let tolerance = self.config.pad.duration_tolerance_secs;
        let drift = (clip.info.duration_secs - stacked.info.duration_secs).abs();
        if drift <= tolerance {
            return Ok(clip);
        }
        tracing::info!(
            clip_secs = clip.info.duration_secs,
            stacked_secs = stacked.info.duration_secs,
            "re-requesting motion clip at the stacked duration"
        );
        request.duration_secs = stacked.info.duration_secs;
        request.fps = fps;
        self.collab
            .motion
            .fetch_clip(request, &scratch.join("motion-equalized.mp4"))
    }

    fn generate_metadata(&self, text: &str) -> ReelResult<Metadata> {
        let attempts = self.config.metadata_attempts;
        for attempt in 1..=attempts {
            match self.collab.metadata.generate(text) {
                Ok(Some(metadata)) => return Ok(metadata),
                Ok(None) => {
                    tracing::warn!(attempt, attempts, "metadata in unexpected shape, retrying")
                }
                Err(e) => tracing::warn!(attempt, attempts, error = %e, "metadata generation failed"),
            }
        }
        Err(ReelError::metadata_format(format!(
            "no usable metadata after {attempts} attempts"
        )))
    }
}

fn panic_error(payload: &(dyn std::any::Any + Send)) -> ReelError {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("run panicked: {msg}").into()
}

#[cfg(test)]
#[path = "../tests/unit/pipeline.rs"]
mod tests;
