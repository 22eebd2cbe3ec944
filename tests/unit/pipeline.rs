use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use rand::SeedableRng as _;

use super::*;
use crate::collab::{ContentItem, Narration};
use crate::foundation::core::Dims;
use crate::media::probe::MediaInfo;

fn item(id: &str) -> ContentItem {
    ContentItem {
        id: id.to_string(),
        title: format!("title {id}"),
        body: "body".to_string(),
        author: "someone".to_string(),
        thread: "r/test".to_string(),
        avatar: None,
    }
}

struct FixedContent(Vec<ContentItem>);

impl ContentStore for FixedContent {
    fn list_items(&self) -> ReelResult<Vec<ContentItem>> {
        Ok(self.0.clone())
    }
}

/// Writes a white PNG `height` pixels tall; declines ids listed in `refuse`.
struct PngRenderer {
    height: u32,
    refuse: Vec<String>,
}

impl ImageRenderer for PngRenderer {
    fn render(&self, item: &ContentItem, width: u32, scratch: &Path) -> ReelResult<Option<PathBuf>> {
        if self.refuse.contains(&item.id) {
            return Ok(None);
        }
        let path = scratch.join(format!("{}.png", item.id));
        image::RgbaImage::from_pixel(width, self.height, image::Rgba([255, 255, 255, 255]))
            .save(&path)
            .unwrap();
        Ok(Some(path))
    }
}

struct FailingNarrator;

impl NarrationService for FailingNarrator {
    fn narrate(&self, _voice: &str, _text: &str, _scratch: &Path) -> ReelResult<Narration> {
        Err(ReelError::validation("tts offline"))
    }
}

struct NoClips;

impl MotionSource for NoClips {
    fn fetch_clip(&self, _request: &ClipRequest, _out: &Path) -> ReelResult<MediaAsset> {
        Err(ReelError::validation("no clips"))
    }
}

/// Returns `None` for the first `bad` calls, then a valid document.
struct FlakyMetadata {
    bad: u32,
    calls: Rc<Cell<u32>>,
}

impl MetadataService for FlakyMetadata {
    fn generate(&self, _text: &str) -> ReelResult<Option<Metadata>> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        if n < self.bad {
            return Ok(None);
        }
        Ok(Some(Metadata {
            title: "t".to_string(),
            description: "d".to_string(),
        }))
    }
}

fn config(root: &Path) -> GeneratorConfig {
    GeneratorConfig {
        canvas: Dims::new(64, 96).unwrap(),
        pad: crate::pad::PadOptions {
            margin_px: 4,
            ..Default::default()
        },
        select_attempts: 50,
        work_dir: root.join("work"),
        output_dir: root.join("out"),
        ledger_path: root.join("ledger.txt"),
        failure_backoff_after: 2,
        failure_backoff_secs: 0.0,
        ..GeneratorConfig::default()
    }
}

fn collaborators(items: Vec<ContentItem>, metadata_calls: Rc<Cell<u32>>) -> Collaborators {
    Collaborators {
        content: Box::new(FixedContent(items)),
        renderer: Box::new(PngRenderer {
            height: 200,
            refuse: vec![],
        }),
        narrator: Box::new(FailingNarrator),
        motion: Box::new(NoClips),
        metadata: Box::new(FlakyMetadata {
            bad: 2,
            calls: metadata_calls,
        }),
    }
}

fn generator(root: &Path, items: Vec<ContentItem>, metadata_calls: Rc<Cell<u32>>) -> Generator {
    Generator::new(config(root), collaborators(items, metadata_calls))
        .unwrap()
        .with_seed(42)
}

fn video_asset(path: PathBuf, duration_secs: f64) -> MediaAsset {
    MediaAsset {
        path,
        info: MediaInfo {
            width: 64,
            height: 48,
            duration_secs,
            fps: Some(Fps::new(30, 1).unwrap()),
            has_video: true,
            has_audio: false,
        },
    }
}

/// Hands back a clip of exactly the requested duration and remembers every request.
struct RecordingClips {
    requests: Rc<RefCell<Vec<(ClipRequest, PathBuf)>>>,
}

impl MotionSource for RecordingClips {
    fn fetch_clip(&self, request: &ClipRequest, out: &Path) -> ReelResult<MediaAsset> {
        self.requests
            .borrow_mut()
            .push((*request, out.to_path_buf()));
        Ok(video_asset(out.to_path_buf(), request.duration_secs))
    }
}

struct PanickingNarrator;

impl NarrationService for PanickingNarrator {
    fn narrate(&self, _voice: &str, _text: &str, _scratch: &Path) -> ReelResult<Narration> {
        panic!("tts exploded");
    }
}

fn run_dirs(work: &Path) -> usize {
    std::fs::read_dir(work)
        .map(|rd| rd.flatten().count())
        .unwrap_or(0)
}

#[test]
fn empty_content_pool_aborts_at_selection() {
    let dir = tempfile::tempdir().unwrap();
    let mut generator = generator(dir.path(), vec![], Rc::default());
    match generator.run_once() {
        RunOutcome::Aborted { stage, error } => {
            assert_eq!(stage, Stage::SelectContent);
            assert!(matches!(error, ReelError::NoEligibleContent { attempts: 0 }));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(run_dirs(&dir.path().join("work")), 0);
}

#[test]
fn selection_is_recorded_even_when_a_later_stage_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut generator = generator(dir.path(), vec![item("only")], Rc::default());

    let outcome = generator.run_once();
    assert!(matches!(
        outcome,
        RunOutcome::Aborted {
            stage: Stage::Narrate,
            ..
        }
    ));
    assert!(generator.ledger().contains("only").unwrap());
    assert_eq!(run_dirs(&dir.path().join("work")), 0);

    // The only item is now used up.
    match generator.run_once() {
        RunOutcome::Aborted { stage, error } => {
            assert_eq!(stage, Stage::SelectContent);
            assert!(matches!(error, ReelError::NoEligibleContent { attempts: 50 }));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn run_loop_counts_failures_per_stage() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![item("a"), item("b")];
    let mut generator = generator(dir.path(), items, Rc::default());

    let stats = generator.run_loop(Some(4)).clone();
    assert_eq!(stats.attempted, 4);
    assert_eq!(stats.succeeded, 0);
    assert_eq!(stats.failed, 4);
    assert_eq!(stats.consecutive_failures, 4);
    assert_eq!(stats.failures_by_stage.get(&Stage::Narrate), Some(&2));
    assert_eq!(stats.failures_by_stage.get(&Stage::SelectContent), Some(&2));
    assert_eq!(stats.failures_by_kind.get("no_eligible_content"), Some(&2));
    assert_eq!(generator.pending_deletions(), 0);
    assert_eq!(run_dirs(&dir.path().join("work")), 0);
}

#[test]
fn metadata_is_retried_before_giving_up() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Rc::new(Cell::new(0));
    let generator = generator(dir.path(), vec![], calls.clone());
    let m = generator.generate_metadata("text").unwrap();
    assert_eq!(m.title, "t");
    assert_eq!(calls.get(), 3);

    let calls = Rc::new(Cell::new(0));
    let mut cfg = config(dir.path());
    cfg.metadata_attempts = 2;
    let generator = Generator::new(
        cfg,
        Collaborators {
            content: Box::new(FixedContent(vec![])),
            renderer: Box::new(PngRenderer {
                height: 10,
                refuse: vec![],
            }),
            narrator: Box::new(FailingNarrator),
            motion: Box::new(NoClips),
            metadata: Box::new(FlakyMetadata {
                bad: 5,
                calls: calls.clone(),
            }),
        },
    )
    .unwrap();
    assert!(matches!(
        generator.generate_metadata("text").unwrap_err(),
        ReelError::MetadataFormat(_)
    ));
    assert_eq!(calls.get(), 2);
}

#[test]
fn loop_stats_reset_streak_on_success() {
    let mut stats = LoopStats::default();
    let fail = RunOutcome::Aborted {
        stage: Stage::Stack,
        error: ReelError::stream_open(Path::new("x.mp4"), "boom"),
    };
    stats.record(&fail);
    stats.record(&fail);
    assert_eq!(stats.consecutive_failures, 2);
    stats.record(&RunOutcome::Success {
        output: PathBuf::from("out/video_0"),
        content_id: "a".to_string(),
    });
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.failures_by_stage.get(&Stage::Stack), Some(&2));
    assert_eq!(Stage::ObtainSecondaryClip.to_string(), "obtain_secondary_clip");
}

#[test]
fn select_skips_used_refused_and_unfit_items() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = UsageLedger::open(dir.path().join("ledger.txt")).unwrap();
    ledger.record("used").unwrap();
    let items = vec![item("used"), item("refused"), item("good")];
    let renderer = PngRenderer {
        height: 40,
        refuse: vec!["refused".to_string()],
    };
    let mut rng = StdRng::seed_from_u64(7);
    let policy = SelectionPolicy {
        max_attempts: 500,
        target_width: 32,
    };

    let picked = select_content(&items, &ledger, &renderer, policy, dir.path(), &mut rng, |p| {
        image_fits(p, Some(40))
    })
    .unwrap();
    assert_eq!(picked.item.id, "good");
    assert!(picked.attempts >= 1);
    assert_eq!(image::image_dimensions(&picked.image_path).unwrap(), (32, 40));
    assert!(ledger.contains("good").unwrap());

    // Too tall for the fitness check: nothing eligible remains.
    let ledger = UsageLedger::open(dir.path().join("other.txt")).unwrap();
    let err = select_content(&items, &ledger, &renderer, policy, dir.path(), &mut rng, |p| {
        image_fits(p, Some(39))
    })
    .unwrap_err();
    assert!(matches!(err, ReelError::NoEligibleContent { attempts: 500 }));
    assert!(ledger.entries().unwrap().is_empty());
}

#[test]
fn scratch_dirs_are_unique_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let a = ScratchDir::create(dir.path()).unwrap();
    let b = ScratchDir::create(dir.path()).unwrap();
    assert_ne!(a.path(), b.path());
    std::fs::write(a.join("x.mp4"), b"x").unwrap();
    std::fs::create_dir(a.join("nested")).unwrap();
    std::fs::write(a.join("nested/y.png"), b"y").unwrap();

    let a_path = a.path().to_path_buf();
    let b_path = b.path().to_path_buf();
    let mut deferred = DeferredDeletions::default();
    a.cleanup(&mut deferred);
    assert!(!a_path.exists());
    assert!(deferred.is_empty());

    drop(b);
    assert!(!b_path.exists());
}

#[cfg(unix)]
#[test]
fn forced_removal_handles_read_only_trees() {
    use std::os::unix::fs::PermissionsExt as _;

    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("locked");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("f.mp4"), b"x").unwrap();
    std::fs::set_permissions(&tree, std::fs::Permissions::from_mode(0o500)).unwrap();

    remove_forcefully(&tree).unwrap();
    assert!(!tree.exists());
    remove_forcefully(&tree).unwrap();
}

#[test]
fn deferred_deletions_retry_until_gone() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("stale");
    std::fs::create_dir(&stale).unwrap();
    let mut deferred = DeferredDeletions::default();
    deferred.push(stale.clone());
    deferred.push(stale.clone());
    assert_eq!(deferred.len(), 1);
    assert_eq!(deferred.retry(), 0);
    assert!(!stale.exists());
}

#[test]
fn persist_moves_video_and_writes_metadata_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("final_vids");
    assert_eq!(next_output_index(&out).unwrap(), 0);
    std::fs::create_dir_all(out.join("video_3")).unwrap();
    std::fs::create_dir_all(out.join("unrelated")).unwrap();
    assert_eq!(next_output_index(&out).unwrap(), 4);

    let video = dir.path().join("final.mp4");
    std::fs::write(&video, b"mp4 bytes").unwrap();
    let metadata = Metadata {
        title: "A title".to_string(),
        description: "A description".to_string(),
    };
    let target = persist_output(&out, "run-1", &video, &metadata).unwrap();

    assert_eq!(target, out.join("video_4"));
    assert!(!video.exists());
    assert_eq!(std::fs::read(target.join(VIDEO_FILE)).unwrap(), b"mp4 bytes");
    let doc: Metadata =
        serde_json::from_slice(&std::fs::read(target.join(METADATA_FILE)).unwrap()).unwrap();
    assert_eq!(doc, metadata);
    assert!(!out.join(".staging-run-1").exists());
}

#[test]
fn persist_failure_leaves_no_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("final_vids");
    let metadata = Metadata {
        title: "t".to_string(),
        description: "d".to_string(),
    };
    assert!(persist_output(&out, "run-2", &dir.path().join("missing.mp4"), &metadata).is_err());
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
}

#[test]
fn background_within_tolerance_is_used_as_is() {
    let dir = tempfile::tempdir().unwrap();
    let requests = Rc::new(RefCell::new(Vec::new()));
    let collab = Collaborators {
        motion: Box::new(RecordingClips {
            requests: requests.clone(),
        }),
        ..collaborators(vec![], Rc::default())
    };
    let generator = Generator::new(config(dir.path()), collab).unwrap();
    let scratch = ScratchDir::create(&dir.path().join("work")).unwrap();
    let fps = Fps::new(30, 1).unwrap();
    let mut request = ClipRequest {
        duration_secs: 2.0,
        dims: Dims::new(64, 48).unwrap(),
        fps,
    };

    let clip = video_asset(scratch.join("motion.mp4"), 1.97);
    let stacked = video_asset(scratch.join("stacked.mp4"), 1.95);
    let background = generator
        .equalize_background(clip, &stacked, &mut request, &scratch, fps)
        .unwrap();
    assert_eq!(background.path, scratch.join("motion.mp4"));
    assert_eq!(background.info.duration_secs, 1.97);
    assert_eq!(request.duration_secs, 2.0);
    assert!(requests.borrow().is_empty());
}

#[test]
fn drifted_background_is_requested_again_at_the_stacked_duration() {
    let dir = tempfile::tempdir().unwrap();
    let requests = Rc::new(RefCell::new(Vec::new()));
    let collab = Collaborators {
        motion: Box::new(RecordingClips {
            requests: requests.clone(),
        }),
        ..collaborators(vec![], Rc::default())
    };
    let generator = Generator::new(config(dir.path()), collab).unwrap();
    let scratch = ScratchDir::create(&dir.path().join("work")).unwrap();
    let fps = Fps::new(30, 1).unwrap();
    let dims = Dims::new(64, 48).unwrap();
    let mut request = ClipRequest {
        duration_secs: 2.0,
        dims,
        fps,
    };

    let clip = video_asset(scratch.join("motion.mp4"), 2.0);
    let stacked = video_asset(scratch.join("stacked.mp4"), 1.8);
    let background = generator
        .equalize_background(clip, &stacked, &mut request, &scratch, fps)
        .unwrap();

    let requests = requests.borrow();
    assert_eq!(requests.len(), 1);
    let (again, out) = &requests[0];
    assert_eq!(again.duration_secs, stacked.info.duration_secs);
    assert_eq!(again.dims, dims);
    assert_eq!(again.fps, fps);
    assert_eq!(out, &scratch.join("motion-equalized.mp4"));
    assert_eq!(background.path, scratch.join("motion-equalized.mp4"));
    assert_eq!(background.info.duration_secs, 1.8);
}

#[test]
fn panicking_collaborator_aborts_the_run_not_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let collab = Collaborators {
        narrator: Box::new(PanickingNarrator),
        ..collaborators(vec![item("a"), item("b")], Rc::default())
    };
    let mut generator = Generator::new(config(dir.path()), collab)
        .unwrap()
        .with_seed(5);

    match generator.run_once() {
        RunOutcome::Aborted { stage, error } => {
            assert_eq!(stage, Stage::Narrate);
            assert_eq!(error.kind(), "other");
            assert!(error.to_string().contains("tts exploded"), "{error}");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(run_dirs(&dir.path().join("work")), 0);

    let stats = generator.run_loop(Some(2)).clone();
    assert_eq!(stats.attempted, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.failures_by_stage.get(&Stage::Narrate), Some(&1));
    assert_eq!(stats.failures_by_stage.get(&Stage::SelectContent), Some(&1));
    assert_eq!(run_dirs(&dir.path().join("work")), 0);
}

#[test]
fn unpublished_video_is_kept_outside_numbered_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("final_vids");
    let video = dir.path().join("final.mp4");
    std::fs::write(&video, b"mp4 bytes").unwrap();

    let kept = keep_unpublished(&out, "run-7", &video).unwrap();
    assert_eq!(kept, out.join(UNPUBLISHED_DIR).join("run-7.mp4"));
    assert!(!video.exists());
    assert_eq!(std::fs::read(&kept).unwrap(), b"mp4 bytes");
    assert_eq!(std::fs::read_dir(out.join(UNPUBLISHED_DIR)).unwrap().count(), 1);
    assert_eq!(next_output_index(&out).unwrap(), 0);

    assert!(keep_unpublished(&out, "run-8", &dir.path().join("missing.mp4")).is_err());
    assert!(!out.join(UNPUBLISHED_DIR).join("run-8.mp4").exists());
}
