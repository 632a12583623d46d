//! Fetches the header and footer fragments and mounts them into the host page.

use crate::page::Page;
use crate::watcher::Watcher;
use crate::watcher::rewrite_subtree;
use gf_core::EmbedConfig;
use gf_core::EmbedError;
use gf_core::EmbedResult;
use gf_core::IsolationMode;
use gf_dom::NodeId;
use gf_html::parse_fragment;
use gf_net::FetchRequest;
use gf_rewrite::Rewriter;
use gf_rewrite::rewrite_markup;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentSlot {
    Header,
    Footer,
}

impl FragmentSlot {
    pub const ALL: [Self; 2] = [Self::Header, Self::Footer];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Footer => "footer",
        }
    }

    pub fn mount_id(self, config: &EmbedConfig) -> &str {
        match self {
            Self::Header => &config.header_mount_id,
            Self::Footer => &config.footer_mount_id,
        }
    }

    pub fn url(self, config: &EmbedConfig) -> String {
        match self {
            Self::Header => config.header_url(),
            Self::Footer => config.footer_url(),
        }
    }
}

/// A host mount element ready to receive one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountPoint {
    pub slot: FragmentSlot,
    /// The host element carrying the well-known id.
    pub element: NodeId,
    /// Where fragment content goes: the element itself, or its shadow root.
    pub container: NodeId,
}

/// Finds the mount element, sets up isolation, starts watching it, and hides it.
pub fn prepare_mount(
    page: &mut Page,
    slot: FragmentSlot,
    config: &EmbedConfig,
) -> EmbedResult<MountPoint> {
    let mount_id = slot.mount_id(config);
    let Some(element) = page.document().element_by_id(mount_id) else {
        return Err(EmbedError::new(
            "embed.mount.missing",
            format!("no element with id `{mount_id}` for the {} fragment", slot.as_str()),
        ));
    };

    let document = page.document_mut();
    let container = match config.isolation {
        IsolationMode::Inline => element,
        IsolationMode::Shadow => match document.shadow_root(element) {
            Some(existing) => existing,
            None => document.attach_shadow(element)?,
        },
    };
    document.set_attribute(element, "hidden", "")?;

    let watcher = Watcher::start(document, element, container, Rewriter::from_config(config))?;
    page.add_watcher(watcher);

    debug!(slot = slot.as_str(), element, container, "prepared mount point");
    Ok(MountPoint {
        slot,
        element,
        container,
    })
}

/// Fetches one fragment, rewrites it, and replaces the mount's content with it.
///
/// Returns the size of the fetched body in bytes.
pub fn load_fragment(page: &mut Page, mount: &MountPoint, config: &EmbedConfig) -> EmbedResult<usize> {
    let url = mount.slot.url(config);
    let response = page
        .registry_mut()
        .fetch(&FetchRequest::get(url.as_str()))
        .inspect_err(|fetch_error| {
            error!(slot = mount.slot.as_str(), %url, code = fetch_error.code, %fetch_error, "fragment fetch failed");
        })?;

    if !response.is_success() {
        error!(slot = mount.slot.as_str(), %url, status = response.status, "fragment fetch returned an error status");
        return Err(EmbedError::new(
            "embed.fragment.status",
            format!("{} fragment at `{url}` returned HTTP {}", mount.slot.as_str(), response.status),
        ));
    }

    let html = response.text();
    let rewriter = Rewriter::from_config(config);
    let (markup, rewritten) = match rewrite_markup(&html, &rewriter) {
        Ok(markup) => (markup, true),
        Err(rewrite_error) => {
            warn!(slot = mount.slot.as_str(), code = rewrite_error.code, %rewrite_error, "markup rewrite failed; rewriting after parse");
            (html, false)
        }
    };

    let document = page.document_mut();
    let fragment = parse_fragment(document, &markup)?;
    if !rewritten {
        rewrite_subtree(document, fragment, &rewriter)?;
    }
    document.replace_children(mount.container, fragment)?;

    info!(slot = mount.slot.as_str(), %url, bytes = response.body.len(), "mounted fragment");
    Ok(response.body.len())
}

#[cfg(test)]
mod tests {
    use super::FragmentSlot;
    use super::load_fragment;
    use super::prepare_mount;
    use crate::page::Page;
    use gf_core::EmbedConfig;
    use gf_core::EmbedResult;
    use gf_core::IsolationMode;
    use gf_net::MemoryFetch;

    const HOST_PAGE: &str = r#"<html><body><div id="external-header"></div><main>app</main></body></html>"#;

    fn must<T>(result: EmbedResult<T>) -> T {
        match result {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    fn page(config: &EmbedConfig, fetch: MemoryFetch) -> Page {
        must(Page::from_html(HOST_PAGE, "https://host.example/", config, Box::new(fetch)))
    }

    #[test]
    fn slots_resolve_locale_qualified_urls() {
        let config = EmbedConfig::default().with_locale("fr");
        assert_eq!(FragmentSlot::Header.url(&config), "https://www.remote.example.org/fr/header");
        assert_eq!(FragmentSlot::Footer.mount_id(&config), "external-footer");
    }

    #[test]
    fn missing_mount_is_reported_before_any_fetch() {
        let config = EmbedConfig::default();
        let fetch = MemoryFetch::new();
        let log = fetch.log();
        let mut page = page(&config, fetch);

        let result = prepare_mount(&mut page, FragmentSlot::Footer, &config);
        assert!(matches!(result, Err(error) if error.code == "embed.mount.missing"));
        assert!(log.urls().is_empty());
    }

    #[test]
    fn mounted_markup_is_rewritten_before_insertion() {
        let config = EmbedConfig::default();
        let fetch = MemoryFetch::new().with_page(
            "https://www.remote.example.org/en/header",
            200,
            r#"<!doctype html><html><body><nav><a href="/en/shop?a=1&amp;b=2">Shop</a></nav></body></html>"#,
        );
        let mut page = page(&config, fetch);

        let mount = must(prepare_mount(&mut page, FragmentSlot::Header, &config));
        assert!(page.document().has_attribute(mount.element, "hidden"));
        let bytes = must(load_fragment(&mut page, &mount, &config));
        assert!(bytes > 0);

        let anchors = page.document().elements_by_tag(mount.container, "a");
        assert_eq!(anchors.len(), 1);
        assert_eq!(
            page.document().attribute(anchors[0], "href"),
            Some("https://www.remote.example.org/en/shop?a=1&b=2")
        );
    }

    #[test]
    fn error_status_leaves_the_mount_empty() {
        let config = EmbedConfig::default();
        let fetch = MemoryFetch::new().with_page("https://www.remote.example.org/en/header", 503, "busy");
        let mut page = page(&config, fetch);

        let mount = must(prepare_mount(&mut page, FragmentSlot::Header, &config));
        let result = load_fragment(&mut page, &mount, &config);
        assert!(matches!(result, Err(error) if error.code == "embed.fragment.status"));
        assert!(page.document().children(mount.container).is_empty());
    }

    #[test]
    fn shadow_isolation_mounts_into_a_shadow_root() {
        let config = EmbedConfig::default().with_isolation(IsolationMode::Shadow);
        let fetch = MemoryFetch::new().with_page(
            "https://www.remote.example.org/en/header",
            200,
            r#"<style>nav{color:red}</style><nav>menu</nav>"#,
        );
        let mut page = page(&config, fetch);

        let mount = must(prepare_mount(&mut page, FragmentSlot::Header, &config));
        assert_ne!(mount.container, mount.element);
        assert_eq!(page.document().shadow_root(mount.element), Some(mount.container));
        must(load_fragment(&mut page, &mount, &config));

        assert!(page.document().children(mount.element).is_empty());
        assert_eq!(page.document().text_content(mount.container), "nav{color:red}menu");
    }
}
