//! External collaborators the generator calls through narrow interfaces, plus the adapters the
//! `reelstack` binary wires up by default.
//!
//! Everything here sits outside the composition core: content acquisition, post image layout,
//! speech synthesis, and metadata text generation are delegated to other programs.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use anyhow::Context as _;
use rand::rngs::StdRng;
use rand::seq::SliceRandom as _;
use rand::{Rng as _, SeedableRng as _};

use crate::foundation::core::{Dims, Fps};
use crate::foundation::error::{ReelError, ReelResult};
use crate::media::encode::output_pix_fmt;
use crate::media::ffmpeg::{ensure_parent_dir, ffmpeg_command, run_ffmpeg};
use crate::media::probe::MediaAsset;

/// One unit of source material. Read-only to the generator.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContentItem {
    /// Stable identifier (usually the post URL); the key stored in the usage ledger.
    pub id: String,
    /// Headline text.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Author label.
    pub author: String,
    /// Source thread label.
    pub thread: String,
    /// Optional avatar reference (URL or path).
    pub avatar: Option<String>,
}

impl ContentItem {
    /// Text read aloud for this item: `"{title}. {body}"` with emoji removed.
    pub fn narration_text(&self) -> String {
        strip_emoji(&format!("{}. {}", self.title, self.body))
    }
}

/// Title and description stored next to a finished video.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Metadata {
    /// Video title.
    pub title: String,
    /// Video description.
    pub description: String,
}

/// Narration audio produced for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct Narration {
    /// Audio file inside the run's scratch directory.
    pub audio_path: PathBuf,
    /// Authoritative duration in seconds; all downstream timing follows it.
    pub duration_secs: f64,
}

/// Request for a secondary motion clip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipRequest {
    /// Exact duration wanted, in seconds.
    pub duration_secs: f64,
    /// Exact pixel size wanted.
    pub dims: Dims,
    /// Frame rate of the clip; must match the scroll video for lockstep stacking.
    pub fps: Fps,
}

/// Source of content items.
pub trait ContentStore {
    /// Every item currently available.
    fn list_items(&self) -> ReelResult<Vec<ContentItem>>;
}

/// Lays a content item out as a still image.
pub trait ImageRenderer {
    /// Render `item` at `target_width` pixels into `scratch`.
    ///
    /// `Ok(None)` means the item cannot be rendered (for example its text is too long) and
    /// must be treated as ineligible.
    fn render(
        &self,
        item: &ContentItem,
        target_width: u32,
        scratch: &Path,
    ) -> ReelResult<Option<PathBuf>>;
}

/// Text-to-speech service.
pub trait NarrationService {
    /// Speak `text` with `voice`, writing the audio into `scratch`.
    fn narrate(&self, voice: &str, text: &str, scratch: &Path) -> ReelResult<Narration>;
}

/// Source of decorative motion footage.
pub trait MotionSource {
    /// Write a clip matching `request` to `out_path`.
    fn fetch_clip(&self, request: &ClipRequest, out_path: &Path) -> ReelResult<MediaAsset>;
}

/// Generates publishing metadata from the narrated text.
pub trait MetadataService {
    /// `Ok(None)` signals output in an unexpected shape.
    fn generate(&self, text: &str) -> ReelResult<Option<Metadata>>;
}

/// Remove emoji, pictographs and their joiners/selectors from `text`.
pub fn strip_emoji(text: &str) -> String {
    text.chars().filter(|c| !is_emoji(*c)).collect()
}

fn is_emoji(c: char) -> bool {
    matches!(
        u32::from(c),
        0x1F000..=0x1FAFF
            | 0x2600..=0x27BF
            | 0x2B00..=0x2BFF
            | 0x2300..=0x23FF
            | 0xFE00..=0xFE0F
            | 0x200D
            | 0x20E3
            | 0xE0020..=0xE007F
    )
}

#[derive(serde::Deserialize, Default)]
#[serde(default)]
struct PostFile {
    url: Option<String>,
    title: String,
    content: String,
    username: String,
    thread_name: String,
    profile_img: Option<String>,
}

/// Content store backed by a directory of scraped post files (`*.json`).
///
/// Each file holds `url`, `title`, `content`, `username`, `thread_name` and `profile_img`.
/// Files without a `url` use their file stem as identifier. Unparseable files are skipped.
#[derive(Clone, Debug)]
pub struct JsonDirContentStore {
    dir: PathBuf,
}

impl JsonDirContentStore {
    /// Store reading from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ContentStore for JsonDirContentStore {
    fn list_items(&self) -> ReelResult<Vec<ContentItem>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list content dir '{}'", self.dir.display()))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to list content dir '{}'", self.dir.display()))?
                .path();
            if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            match read_post(&path) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping post file"),
            }
        }
        tracing::debug!(count = items.len(), dir = %self.dir.display(), "listed content items");
        Ok(items)
    }
}

fn read_post(path: &Path) -> anyhow::Result<ContentItem> {
    let bytes = std::fs::read(path).context("read post file")?;
    let post: PostFile = serde_json::from_slice(&bytes).context("parse post json")?;
    let id = match post.url.filter(|u| !u.trim().is_empty()) {
        Some(url) => url.trim().to_string(),
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("post file has no stem")?,
    };
    Ok(ContentItem {
        id,
        title: post.title,
        body: post.content,
        author: post.username,
        thread: post.thread_name,
        avatar: post.profile_img.filter(|s| !s.is_empty()),
    })
}

/// An external program plus an argument template.
///
/// Arguments may contain `{name}` placeholders which are substituted per call; unknown
/// placeholders are left untouched.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommandTemplate {
    /// Executable name or path.
    pub program: String,
    /// Argument templates.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    /// Build a template.
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Arguments with every `{key}` replaced by its value.
    pub fn expand_args(&self, vars: &BTreeMap<&str, String>) -> Vec<String> {
        self.args.iter().map(|arg| expand_placeholders(arg, vars)).collect()
    }

    fn command(&self, vars: &BTreeMap<&str, String>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.expand_args(vars));
        cmd
    }
}

// Single pass, so substituted values are never expanded again.
fn expand_placeholders(arg: &str, vars: &BTreeMap<&str, String>) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let hit = tail
            .find('}')
            .and_then(|end| vars.get(&tail[1..end]).map(|value| (end, value)));
        match hit {
            Some((end, value)) => {
                out.push_str(value);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Renders post images by running an external program.
///
/// Placeholders: `{id}`, `{title}`, `{body}`, `{author}`, `{thread}`, `{avatar}`, `{width}`,
/// `{out}`. The program must write a PNG to `{out}`; a non-zero exit or a missing file marks
/// the item ineligible.
#[derive(Clone, Debug)]
pub struct CommandImageRenderer {
    template: CommandTemplate,
}

impl CommandImageRenderer {
    /// Renderer running `template`.
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

impl ImageRenderer for CommandImageRenderer {
    fn render(
        &self,
        item: &ContentItem,
        target_width: u32,
        scratch: &Path,
    ) -> ReelResult<Option<PathBuf>> {
        let out = scratch.join("post.png");
        if out.exists() {
            std::fs::remove_file(&out)
                .with_context(|| format!("failed to remove stale '{}'", out.display()))?;
        }
        let vars = BTreeMap::from([
            ("id", item.id.clone()),
            ("title", item.title.clone()),
            ("body", item.body.clone()),
            ("author", item.author.clone()),
            ("thread", item.thread.clone()),
            ("avatar", item.avatar.clone().unwrap_or_default()),
            ("width", target_width.to_string()),
            ("out", out.display().to_string()),
        ]);
        let status = self
            .template
            .command(&vars)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .with_context(|| format!("failed to spawn image renderer '{}'", self.template.program))?;

        if !status.success() {
            tracing::debug!(id = %item.id, %status, "image renderer declined item");
            return Ok(None);
        }
        if !out.is_file() {
            tracing::warn!(id = %item.id, "image renderer succeeded without writing an image");
            return Ok(None);
        }
        Ok(Some(out))
    }
}

/// Narrates text by running an external text-to-speech program.
///
/// Placeholders: `{voice}`, `{text}`, `{text_file}` (the text written to a file), `{out}`.
/// The duration of the produced audio is probed.
#[derive(Clone, Debug)]
pub struct CommandNarrator {
    template: CommandTemplate,
}

impl CommandNarrator {
    /// Narrator running `template`.
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

impl NarrationService for CommandNarrator {
    fn narrate(&self, voice: &str, text: &str, scratch: &Path) -> ReelResult<Narration> {
        let out = scratch.join("narration.wav");
        let text_file = scratch.join("narration.txt");
        std::fs::write(&text_file, text)
            .with_context(|| format!("failed to write '{}'", text_file.display()))?;

        let vars = BTreeMap::from([
            ("voice", voice.to_string()),
            ("text", text.to_string()),
            ("text_file", text_file.display().to_string()),
            ("out", out.display().to_string()),
        ]);
        let output = self
            .template
            .command(&vars)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to spawn narrator '{}'", self.template.program))?;
        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "narrator exited with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )
            .into());
        }

        let asset = MediaAsset::open(&out)?;
        if !asset.info.has_audio {
            return Err(ReelError::asset_unreadable(&out, "narration has no audio stream"));
        }
        Ok(Narration {
            audio_path: out,
            duration_secs: asset.info.duration_secs,
        })
    }
}

/// Generates metadata by running an external program.
///
/// The text is passed on stdin and through the `{text}` placeholder. Stdout must be a JSON
/// object with string fields `title` and `description`.
#[derive(Clone, Debug)]
pub struct CommandMetadataService {
    template: CommandTemplate,
}

impl CommandMetadataService {
    /// Service running `template`.
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }
}

impl MetadataService for CommandMetadataService {
    fn generate(&self, text: &str) -> ReelResult<Option<Metadata>> {
        let vars = BTreeMap::from([("text", text.to_string())]);
        let mut child = self
            .template
            .command(&vars)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| {
                format!("failed to spawn metadata generator '{}'", self.template.program)
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            // A generator that ignores stdin may close it early.
            let _ = stdin.write_all(text.as_bytes());
        }
        let output = child
            .wait_with_output()
            .context("failed to wait for metadata generator")?;
        if !output.status.success() {
            tracing::warn!(status = %output.status, "metadata generator failed");
            return Ok(None);
        }
        Ok(parse_metadata(&output.stdout))
    }
}

/// Parse a `{title, description}` document; `None` when the shape is wrong or a field is blank.
pub fn parse_metadata(bytes: &[u8]) -> Option<Metadata> {
    match serde_json::from_slice::<Metadata>(bytes) {
        Ok(m) if !m.title.trim().is_empty() && !m.description.trim().is_empty() => Some(m),
        Ok(_) => {
            tracing::warn!("metadata generator returned an empty title or description");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "metadata generator returned malformed output");
            None
        }
    }
}

const CLIP_EXTENSIONS: [&str; 5] = ["mp4", "mov", "mkv", "webm", "m4v"];

/// Cuts random windows out of a directory of long gameplay-style videos.
///
/// A clip long enough for the request is picked at random, a random window of exactly the
/// requested duration is cut from it, and the window is scaled to cover the target size and
/// centre-cropped. The source audio is dropped.
#[derive(Debug)]
pub struct ClipLibraryMotionSource {
    dir: PathBuf,
    rng: Mutex<StdRng>,
}

impl ClipLibraryMotionSource {
    /// Library over `dir`, seeded from OS entropy.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_rng(dir, StdRng::from_entropy())
    }

    /// Library over `dir` with a fixed seed.
    pub fn with_seed(dir: impl Into<PathBuf>, seed: u64) -> Self {
        Self::with_rng(dir, StdRng::seed_from_u64(seed))
    }

    fn with_rng(dir: impl Into<PathBuf>, rng: StdRng) -> Self {
        Self {
            dir: dir.into(),
            rng: Mutex::new(rng),
        }
    }

    /// Library videos at least `min_secs` long.
    pub fn candidates(&self, min_secs: f64) -> ReelResult<Vec<MediaAsset>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list clip dir '{}'", self.dir.display()))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to list clip dir '{}'", self.dir.display()))?
                .path();
            let is_video = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| CLIP_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)));
            if is_video {
                paths.push(path);
            }
        }
        paths.sort();

        let mut out = Vec::new();
        for path in paths {
            match MediaAsset::open(&path) {
                Ok(asset) if asset.info.has_video && asset.info.duration_secs >= min_secs => {
                    out.push(asset)
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping clip"),
            }
        }
        Ok(out)
    }
}

impl MotionSource for ClipLibraryMotionSource {
    fn fetch_clip(&self, request: &ClipRequest, out_path: &Path) -> ReelResult<MediaAsset> {
        if !request.duration_secs.is_finite() || request.duration_secs <= 0.0 {
            return Err(ReelError::validation(format!(
                "clip duration must be positive, got {}",
                request.duration_secs
            )));
        }
        let candidates = self.candidates(request.duration_secs)?;
        let (source, start) = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            let Some(source) = candidates.choose(&mut *rng) else {
                return Err(ReelError::asset_unreadable(
                    &self.dir,
                    format!("no clip lasts at least {:.2}s", request.duration_secs),
                ));
            };
            let slack = (source.info.duration_secs - request.duration_secs).max(0.0);
            let start = if slack > 0.0 {
                rng.gen_range(0.0..slack)
            } else {
                0.0
            };
            (source.clone(), start)
        };

        let Dims { width, height } = request.dims;
        ensure_parent_dir(out_path)?;
        let mut cmd = ffmpeg_command();
        cmd.args(["-ss", &format!("{start:.3}")])
            .arg("-i")
            .arg(&source.path)
            .args(["-t", &format!("{:.6}", request.duration_secs)])
            .args([
                "-vf",
                &format!(
                    "scale={width}:{height}:force_original_aspect_ratio=increase,crop={width}:{height},setsar=1"
                ),
                "-r",
                &request.fps.to_string(),
                "-an",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-pix_fmt",
                output_pix_fmt(request.dims),
            ])
            .arg(out_path);
        run_ffmpeg(cmd, "clip extraction")?;

        tracing::info!(
            source = %source.path.display(),
            start_secs = start,
            duration_secs = request.duration_secs,
            dims = %request.dims,
            "cut motion clip"
        );
        MediaAsset::open(out_path)
    }
}

#[cfg(test)]
#[path = "../tests/unit/collab.rs"]
mod tests;
