//! Keeps URL attributes inside a mounted subtree pointed at the remote origin.

use gf_core::EmbedResult;
use gf_dom::Document;
use gf_dom::MutationRecord;
use gf_dom::NodeId;
use gf_dom::ObserverHandle;
use gf_dom::ObserverOptions;
use gf_rewrite::AttributeKind;
use gf_rewrite::Rewriter;
use gf_rewrite::is_excluded;

pub use gf_rewrite::ORIGINAL_HREF_ATTRIBUTE;
use tracing::debug;
use tracing::warn;

/// Listener tag marking anchors whose clicks the page routes through [`anchor_click_target`].
pub const CLICK_LISTENER: &str = "graft:anchor-click";

const WATCHED_ATTRIBUTES: [&str; 3] = ["src", "href", "srcset"];

/// An element as the watcher sees it, decided once per observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedNode {
    Anchor {
        href: Option<String>,
        target: Option<String>,
    },
    Image {
        src: Option<String>,
        srcset: Option<String>,
    },
    Link {
        href: Option<String>,
    },
    Script {
        src: Option<String>,
    },
    Source {
        src: Option<String>,
        srcset: Option<String>,
    },
    Other,
}

impl ObservedNode {
    pub fn classify(doc: &Document, id: NodeId) -> Self {
        let Some(element) = doc.element(id) else {
            return Self::Other;
        };
        let attr = |name: &str| element.attr(name).map(str::to_owned);

        match element.tag.as_str() {
            "a" => Self::Anchor {
                href: attr("href"),
                target: attr("target"),
            },
            "img" => Self::Image {
                src: attr("src"),
                srcset: attr("srcset"),
            },
            "link" => Self::Link { href: attr("href") },
            "script" => Self::Script { src: attr("src") },
            "source" => Self::Source {
                src: attr("src"),
                srcset: attr("srcset"),
            },
            _ => Self::Other,
        }
    }

    /// URL-bearing attributes present on the element, as `(name, value)`.
    pub fn url_attributes(&self) -> Vec<(&'static str, &str)> {
        let pairs: Vec<(&'static str, &Option<String>)> = match self {
            Self::Anchor { href, .. } | Self::Link { href } => vec![("href", href)],
            Self::Image { src, srcset } | Self::Source { src, srcset } => {
                vec![("src", src), ("srcset", srcset)]
            }
            Self::Script { src } => vec![("src", src)],
            Self::Other => Vec::new(),
        };

        pairs
            .into_iter()
            .filter_map(|(name, value)| value.as_deref().map(|value| (name, value)))
            .collect()
    }

    pub fn is_anchor(&self) -> bool {
        matches!(self, Self::Anchor { .. })
    }
}

/// Counters for one delivered batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub records: usize,
    pub rewritten: usize,
    pub failures: usize,
}

/// One observer subscription on a mount point.
#[derive(Debug, Clone)]
pub struct Watcher {
    handle: ObserverHandle,
    mount: NodeId,
    root: NodeId,
    rewriter: Rewriter,
}

impl Watcher {
    /// Observes `root` (the mount point or its shadow root) for insertions and URL attribute changes.
    pub fn start(
        doc: &mut Document,
        mount: NodeId,
        root: NodeId,
        rewriter: Rewriter,
    ) -> EmbedResult<Self> {
        let handle = doc.observe(root, ObserverOptions::subtree_attributes(&WATCHED_ATTRIBUTES))?;
        debug!(mount, root, handle = handle.as_u64(), "watching mount point");
        Ok(Self {
            handle,
            mount,
            root,
            rewriter,
        })
    }

    pub fn stop(self, doc: &mut Document) -> bool {
        doc.disconnect(self.handle)
    }

    pub fn handle(&self) -> ObserverHandle {
        self.handle
    }

    pub fn mount(&self) -> NodeId {
        self.mount
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn rewriter(&self) -> &Rewriter {
        &self.rewriter
    }

    /// True when `node` sits under this watcher's mount point in the composed tree.
    pub fn covers(&self, doc: &Document, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root || id == self.mount {
                return true;
            }
            current = doc.composed_parent(id);
        }
        false
    }

    /// Handles one batch in arrival order. A failing node is logged and skipped.
    pub fn process(&self, doc: &mut Document, records: Vec<MutationRecord>) -> BatchStats {
        let mut stats = BatchStats {
            records: records.len(),
            ..BatchStats::default()
        };

        for record in records {
            match record {
                MutationRecord::ChildList { added, .. } => {
                    for node in added {
                        if doc.element(node).is_none() {
                            continue;
                        }
                        let mut batch = vec![node];
                        batch.extend(
                            doc.descendants(node)
                                .into_iter()
                                .filter(|id| doc.element(*id).is_some()),
                        );
                        for id in batch {
                            self.tally(&mut stats, id, rewrite_node(doc, id, &self.rewriter));
                        }
                    }
                }
                MutationRecord::Attributes { target, name, .. } => {
                    let result = rewrite_attribute(doc, target, &name, &self.rewriter);
                    self.tally(&mut stats, target, result);
                }
            }
        }

        stats
    }

    fn tally(&self, stats: &mut BatchStats, node: NodeId, result: EmbedResult<usize>) {
        match result {
            Ok(count) => stats.rewritten += count,
            Err(error) => {
                stats.failures += 1;
                warn!(mount = self.mount, node, code = error.code, %error, "failed to rewrite node");
            }
        }
    }
}

/// Rewrites every URL attribute of `id` and wires anchors for click routing.
pub fn rewrite_node(doc: &mut Document, id: NodeId, rewriter: &Rewriter) -> EmbedResult<usize> {
    let observed = ObservedNode::classify(doc, id);
    let mut rewritten = 0;
    for (name, value) in observed.url_attributes() {
        if apply(doc, id, &observed, name, value, rewriter)? {
            rewritten += 1;
        }
    }
    if observed.is_anchor() {
        doc.add_listener(id, CLICK_LISTENER)?;
    }
    Ok(rewritten)
}

/// Rewrites the single attribute `name` of `id`, when it is a URL attribute of that element.
pub fn rewrite_attribute(
    doc: &mut Document,
    id: NodeId,
    name: &str,
    rewriter: &Rewriter,
) -> EmbedResult<usize> {
    let observed = ObservedNode::classify(doc, id);
    let Some((name, value)) = observed
        .url_attributes()
        .into_iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
    else {
        return Ok(0);
    };

    Ok(usize::from(apply(doc, id, &observed, name, value, rewriter)?))
}

/// Walks a detached subtree, rewriting in place. Used when the markup pass is unavailable.
pub fn rewrite_subtree(doc: &mut Document, root: NodeId, rewriter: &Rewriter) -> EmbedResult<usize> {
    let mut rewritten = 0;
    for id in doc.descendants(root) {
        if doc.element(id).is_some() {
            rewritten += rewrite_node(doc, id, rewriter)?;
        }
    }
    Ok(rewritten)
}

fn apply(
    doc: &mut Document,
    id: NodeId,
    observed: &ObservedNode,
    name: &str,
    value: &str,
    rewriter: &Rewriter,
) -> EmbedResult<bool> {
    let Some(kind) = AttributeKind::from_attribute(name) else {
        return Ok(false);
    };
    let tracks_original = observed.is_anchor() && kind == AttributeKind::Href;
    if !rewriter.needs_rewrite(value, kind) {
        if tracks_original {
            forget_stale_original(doc, id, value, rewriter)?;
        }
        return Ok(false);
    }

    let updated = rewriter.rewrite(value, kind);
    if tracks_original {
        doc.set_attribute(id, ORIGINAL_HREF_ATTRIBUTE, value)?;
    }
    doc.set_attribute(id, name, &updated)?;
    Ok(true)
}

/// Drops the recorded original once `href` no longer is its rewrite.
fn forget_stale_original(doc: &mut Document, id: NodeId, href: &str, rewriter: &Rewriter) -> EmbedResult<()> {
    let stale = doc
        .attribute(id, ORIGINAL_HREF_ATTRIBUTE)
        .is_some_and(|original| rewriter.rewrite(original, AttributeKind::Href) != href);
    if stale {
        doc.remove_attribute(id, ORIGINAL_HREF_ATTRIBUTE)?;
    }
    Ok(())
}

/// Where a click on `anchor` should send the page, or `None` to leave the click alone.
pub fn anchor_click_target(doc: &Document, anchor: NodeId, rewriter: &Rewriter) -> Option<String> {
    let ObservedNode::Anchor {
        href: Some(href),
        target,
    } = ObservedNode::classify(doc, anchor)
    else {
        return None;
    };

    if target.as_deref().is_some_and(opens_new_context) {
        return None;
    }

    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let rewritten = doc.has_attribute(anchor, ORIGINAL_HREF_ATTRIBUTE) && rewriter.origin().owns(href);
    if rewritten {
        return Some(href.to_owned());
    }
    if is_excluded(href) {
        return None;
    }

    Some(rewriter.rewrite(href, AttributeKind::Href))
}

fn opens_new_context(target: &str) -> bool {
    let target = target.trim();
    !target.is_empty()
        && !["_self", "_parent", "_top"]
            .iter()
            .any(|keyword| target.eq_ignore_ascii_case(keyword))
}
