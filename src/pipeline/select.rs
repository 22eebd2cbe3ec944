use std::path::{Path, PathBuf};

use rand::Rng;
use rand::seq::SliceRandom as _;

use crate::collab::{ContentItem, ImageRenderer};
use crate::foundation::error::{ReelError, ReelResult};
use crate::ledger::UsageLedger;

/// Bounds for [`select_content`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionPolicy {
    /// Random draws before giving up.
    pub max_attempts: u32,
    /// Width the image renderer is asked for.
    pub target_width: u32,
}

/// A content item chosen for a run, already claimed in the ledger.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    /// The chosen item.
    pub item: ContentItem,
    /// Its rendered still image.
    pub image_path: PathBuf,
    /// Draws taken, including the successful one.
    pub attempts: u32,
}

/// Draw items uniformly at random until one is unused, renderable and `fit`.
///
/// The winner is claimed in `ledger` before returning, so an item is marked used as soon as
/// it is selected even if the run fails later. Renderer errors count as ineligible draws.
/// Fails with [`ReelError::NoEligibleContent`] once `policy.max_attempts` draws are spent.
pub fn select_content<R, F>(
    items: &[ContentItem],
    ledger: &UsageLedger,
    renderer: &dyn ImageRenderer,
    policy: SelectionPolicy,
    scratch: &Path,
    rng: &mut R,
    mut fit: F,
) -> ReelResult<Selection>
where
    R: Rng + ?Sized,
    F: FnMut(&Path) -> ReelResult<bool>,
{
    for attempt in 1..=policy.max_attempts {
        let Some(item) = items.choose(rng) else {
            break;
        };
        if ledger.contains(&item.id)? {
            tracing::trace!(id = %item.id, "already used, skipping");
            continue;
        }

        let image_path = match renderer.render(item, policy.target_width, scratch) {
            Ok(Some(path)) => path,
            Ok(None) => {
                tracing::debug!(id = %item.id, "item could not be rendered");
                continue;
            }
            Err(e) => {
                tracing::warn!(id = %item.id, error = %e, "image renderer failed");
                continue;
            }
        };
        if !fit(&image_path)? {
            tracing::debug!(id = %item.id, "rendered image rejected");
            continue;
        }
        if !ledger.claim(&item.id)? {
            tracing::debug!(id = %item.id, "claimed by another generator");
            continue;
        }

        tracing::info!(id = %item.id, attempts = attempt, "selected content");
        return Ok(Selection {
            item: item.clone(),
            image_path,
            attempts: attempt,
        });
    }

    Err(ReelError::NoEligibleContent {
        attempts: if items.is_empty() {
            0
        } else {
            policy.max_attempts
        },
    })
}

/// Fitness check for rendered images: decodable and at most `max_height` pixels tall.
pub fn image_fits(path: &Path, max_height: Option<u32>) -> ReelResult<bool> {
    let (_, height) = match image::image_dimensions(path) {
        Ok(dims) => dims,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "rendered image unreadable");
            return Ok(false);
        }
    };
    Ok(max_height.is_none_or(|max| height <= max))
}
