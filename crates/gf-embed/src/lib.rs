//! Embeds a remote site's header and footer into a host [`Page`].
//!
//! [`embed`] runs once per page: it watches the mount points, loads both
//! fragments one after the other, brings the necessary fragment scripts back
//! to life, and reveals each mount once it has settled. Failures stay local to
//! the fragment they happen in.

pub mod loader;
pub mod page;
pub mod reanimator;
pub mod watcher;

#[cfg(test)]
mod tests;

use gf_core::EmbedConfig;
use loader::load_fragment;
use loader::prepare_mount;
use page::PageTask;
use reanimator::reanimate;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

pub use loader::FragmentSlot;
pub use loader::MountPoint;
pub use page::ClickOutcome;
pub use page::Page;
pub use page::ScriptRun;
pub use reanimator::Reanimation;
pub use watcher::ObservedNode;
pub use watcher::Watcher;

/// How one fragment ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOutcome {
    Mounted {
        bytes: usize,
        scripts_kept: usize,
        scripts_discarded: usize,
    },
    Failed {
        code: &'static str,
    },
    /// The host page has no element with the slot's id; nothing was fetched.
    MountMissing,
}

impl FragmentOutcome {
    pub fn is_mounted(&self) -> bool {
        matches!(self, Self::Mounted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedReport {
    Embedded {
        header: FragmentOutcome,
        footer: FragmentOutcome,
        scripts: ScriptRun,
    },
    /// The configuration did not validate; the page was left untouched.
    Rejected {
        code: &'static str,
    },
    /// An earlier call already embedded this page.
    AlreadyEmbedded,
}

/// Runs the embedding pipeline on `page`.
pub fn embed(page: &mut Page, config: &EmbedConfig) -> EmbedReport {
    if page.is_embedded() {
        debug!("page already embedded; skipping");
        return EmbedReport::AlreadyEmbedded;
    }
    if let Err(invalid) = config.validate() {
        error!(code = invalid.code, %invalid, "embed configuration rejected");
        return EmbedReport::Rejected { code: invalid.code };
    }
    page.mark_embedded();

    let mut prepared: Vec<(FragmentSlot, Result<MountPoint, FragmentOutcome>)> = Vec::new();
    for slot in FragmentSlot::ALL {
        let mount = match prepare_mount(page, slot, config) {
            Ok(mount) => Ok(mount),
            Err(missing) if missing.code == "embed.mount.missing" => {
                warn!(slot = slot.as_str(), %missing, "mount point missing; skipping fragment");
                Err(FragmentOutcome::MountMissing)
            }
            Err(failure) => {
                error!(slot = slot.as_str(), code = failure.code, %failure, "failed to prepare mount point");
                Err(FragmentOutcome::Failed { code: failure.code })
            }
        };
        prepared.push((slot, mount));
    }

    let mut outcomes = Vec::with_capacity(prepared.len());
    for (slot, mount) in prepared {
        let outcome = match &mount {
            Ok(mount) => mount_fragment(page, mount, config),
            Err(outcome) => *outcome,
        };
        outcomes.push((slot, mount, outcome));
    }

    page.flush_mutations();
    let scripts = page.run_pending_scripts();
    page.flush_mutations();

    for (_, mount, outcome) in &outcomes {
        let Ok(mount) = mount else {
            continue;
        };
        if outcome.is_mounted() {
            page.schedule(config.settle_delay, PageTask::Reveal(mount.element));
        } else {
            page.run_task(PageTask::Reveal(mount.element));
        }
    }

    let outcome_for = |wanted: FragmentSlot| {
        outcomes
            .iter()
            .find(|(slot, _, _)| *slot == wanted)
            .map_or(FragmentOutcome::MountMissing, |(_, _, outcome)| *outcome)
    };
    let report = EmbedReport::Embedded {
        header: outcome_for(FragmentSlot::Header),
        footer: outcome_for(FragmentSlot::Footer),
        scripts,
    };
    info!(?report, "embedding finished");
    report
}

fn mount_fragment(page: &mut Page, mount: &MountPoint, config: &EmbedConfig) -> FragmentOutcome {
    let bytes = match load_fragment(page, mount, config) {
        Ok(bytes) => bytes,
        Err(failure) => return FragmentOutcome::Failed { code: failure.code },
    };

    page.flush_mutations();
    match reanimate(page.document_mut(), mount.container, config) {
        Ok(reanimation) => FragmentOutcome::Mounted {
            bytes,
            scripts_kept: reanimation.kept,
            scripts_discarded: reanimation.discarded,
        },
        Err(failure) => {
            error!(slot = mount.slot.as_str(), code = failure.code, %failure, "script reanimation failed");
            FragmentOutcome::Failed { code: failure.code }
        }
    }
}
