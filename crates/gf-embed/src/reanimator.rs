//! Turns the inert scripts of a mounted fragment into executable ones, keeping
//! only the support bundles and the framework data payload.

use gf_core::EmbedConfig;
use gf_core::EmbedResult;
use gf_dom::Document;
use gf_dom::NodeId;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reanimation {
    pub kept: usize,
    pub discarded: usize,
}

/// Support bundles and the data payload survive; every other script is dropped unexecuted.
pub fn is_necessary(doc: &Document, script: NodeId, config: &EmbedConfig) -> bool {
    let is_support = doc
        .attribute(script, "src")
        .is_some_and(|src| src.contains(config.support_script_marker.as_str()));
    let is_data = doc.attribute(script, "id") == Some(config.data_script_id.as_str());
    is_support || is_data
}

/// Replaces each necessary script under `root` with a fresh copy and removes the rest.
///
/// The copies are created outside the parser, so they run once connected.
pub fn reanimate(doc: &mut Document, root: NodeId, config: &EmbedConfig) -> EmbedResult<Reanimation> {
    let mut outcome = Reanimation::default();

    for script in doc.elements_by_tag(root, "script") {
        let Some(parent) = doc.parent(script) else {
            continue;
        };

        if !is_necessary(doc, script, config) {
            doc.remove_child(parent, script)?;
            outcome.discarded += 1;
            continue;
        }

        let attrs = doc
            .element(script)
            .map(|element| element.attrs.clone())
            .unwrap_or_default();
        let text = doc.text_content(script);

        let fresh = doc.create_element("script");
        for (name, value) in &attrs {
            doc.set_attribute(fresh, name, value)?;
        }
        doc.set_text_content(fresh, &text)?;
        doc.replace_child(parent, fresh, script)?;
        outcome.kept += 1;
    }

    debug!(root, kept = outcome.kept, discarded = outcome.discarded, "reanimated fragment scripts");
    Ok(outcome)
}
