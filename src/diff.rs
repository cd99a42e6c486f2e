//! Field-level diffing between a source repository and its mirror
//!
//! Pure functions only; nothing here touches the network. The engine
//! composes these into at most three mutating calls per repository:
//! one coalesced metadata edit, one topic replace, one mirror pull.

use chrono::{DateTime, Utc};

use crate::gitea::{GiteaRepo, RepoEdit};
use crate::source::SourceRepo;
use crate::sync::{SyncOptions, UpdatedField};

/// Mirror interval sentinel Gitea uses for "periodic pulling disabled".
/// Archived sources get this value so the destination stops polling a
/// repository that can no longer change.
pub const ARCHIVED_MIRROR_INTERVAL: &str = "0s";

/// A destination repository may only be mutated when it is a mirror
/// whose upstream is exactly this source repository. A same-named
/// repository that is not our mirror must never be touched, otherwise
/// an unrelated repository could be silently overwritten.
pub fn is_owned_mirror(dest: &GiteaRepo, source: &SourceRepo) -> bool {
    dest.mirror && source.clone_urls.iter().any(|url| *url == dest.original_url)
}

/// A mirror is stale when the source saw a push after the mirror's
/// last pull. Covers pushes that land between scheduled pulls and
/// repositories whose interval was just re-enabled after unarchiving.
pub fn is_stale(source: &SourceRepo, dest: &GiteaRepo) -> bool {
    let last_synced = dest.mirror_updated.unwrap_or(DateTime::<Utc>::MIN_UTC);
    source.pushed_at > last_synced
}

pub fn description_differs(source: &SourceRepo, dest: &GiteaRepo) -> bool {
    dest.description != source.description
}

pub fn visibility_differs(source: &SourceRepo, dest: &GiteaRepo) -> bool {
    dest.private != source.private
}

/// Archived sources should have pulling disabled; everything else
/// should be on the configured interval. Only the disabled/enabled
/// state is compared, not the exact interval value.
pub fn mirror_interval_differs(source: &SourceRepo, dest: &GiteaRepo) -> bool {
    if source.archived {
        dest.mirror_interval != ARCHIVED_MIRROR_INTERVAL
    } else {
        dest.mirror_interval == ARCHIVED_MIRROR_INTERVAL
    }
}

/// The interval value to write when `mirror_interval_differs`.
pub fn resolved_mirror_interval<'a>(source: &SourceRepo, options: &'a SyncOptions) -> &'a str {
    if source.archived {
        ARCHIVED_MIRROR_INTERVAL
    } else {
        &options.dest_mirror_interval
    }
}

/// Topic comparison is asymmetric on purpose: only a source topic
/// missing from the destination counts as a difference, so extra
/// destination-only topics never trigger a write on their own. The
/// corrective action is still a full replace with the source set,
/// which drops those extra topics once any difference is detected.
pub fn topics_differ(source_topics: &[String], dest_topics: &[String]) -> bool {
    source_topics
        .iter()
        .any(|topic| !dest_topics.contains(topic))
}

/// Collect every enabled metadata difference into a single edit
/// request, paired with the fields it would update. Topics are handled
/// separately because they go through a different endpoint.
pub fn plan_metadata_edit(
    source: &SourceRepo,
    dest: &GiteaRepo,
    options: &SyncOptions,
) -> (RepoEdit, Vec<UpdatedField>) {
    let mut edit = RepoEdit::default();
    let mut fields = Vec::new();

    if options.sync_description && description_differs(source, dest) {
        edit.description = Some(source.description.clone());
        fields.push(UpdatedField::Description);
    }

    if options.sync_visibility && visibility_differs(source, dest) {
        edit.private = Some(source.private);
        fields.push(UpdatedField::Visibility);
    }

    if options.sync_mirror_interval && mirror_interval_differs(source, dest) {
        edit.mirror_interval = Some(resolved_mirror_interval(source, options).to_string());
        fields.push(UpdatedField::MirrorInterval);
    }

    (edit, fields)
}
