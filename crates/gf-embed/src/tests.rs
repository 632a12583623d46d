use crate::ClickOutcome;
use crate::EmbedReport;
use crate::FragmentOutcome;
use crate::Page;
use crate::embed;
use core::time::Duration;
use gf_core::EmbedConfig;
use gf_core::EmbedError;
use gf_core::EmbedResult;
use gf_core::IsolationMode;
use gf_dom::NodeId;
use gf_net::FetchResponse;
use gf_net::MemoryFetch;

const HOST: &str = "https://host.example/en";
const REMOTE: &str = "https://www.remote.example.org";
const HEADER_URL: &str = "https://www.remote.example.org/en/header";
const FOOTER_URL: &str = "https://www.remote.example.org/en/footer";

const HOST_PAGE: &str = concat!(
    "<!doctype html><html><head><title>Store</title></head><body>",
    "<div id=\"external-header\"></div>",
    "<main><a id=\"host-link\" href=\"/en/cart\">Cart</a></main>",
    "<div id=\"external-footer\"></div>",
    "</body></html>",
);

const HEADER: &str = concat!(
    "<!doctype html><html><head><link rel=\"stylesheet\" href=\"/_next/static/css/header.css\"></head>",
    "<body><nav id=\"remote-nav\">",
    "<img id=\"logo\" src=\"/_next/image?x=1\" alt=\"logo\">",
    "<a id=\"contact\" href=\"/en/contact\"><span id=\"contact-label\">Contact</span></a>",
    "<a id=\"help\" href=\"/en/help\" target=\"_blank\">Help</a>",
    "<a id=\"mail\" href=\"mailto:help@remote.example.org\">Mail</a>",
    "</nav></body></html>",
);

const FOOTER: &str = "<footer><a id=\"terms\" href=\"en/terms\">Terms</a></footer>";

fn must<T>(result: EmbedResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => panic!("{error}"),
    }
}

fn page_with(html: &str, config: &EmbedConfig, fetch: MemoryFetch) -> Page {
    must(Page::from_html(html, HOST, config, Box::new(fetch)))
}

fn node(page: &Page, id: &str) -> NodeId {
    match page.document().element_by_id(id) {
        Some(value) => value,
        None => panic!("no element with id `{id}`"),
    }
}

fn eval(page: &mut Page, expression: &str) -> String {
    must(page.script_mut().evaluate_string(expression))
}

fn mounted(report: EmbedReport) -> (FragmentOutcome, FragmentOutcome) {
    match report {
        EmbedReport::Embedded { header, footer, .. } => (header, footer),
        other => panic!("unexpected report {other:?}"),
    }
}

#[test]
fn header_references_resolve_against_the_remote_origin() {
    let config = EmbedConfig::default();
    let fetch = MemoryFetch::new()
        .with_page(HEADER_URL, 200, HEADER)
        .with_page(FOOTER_URL, 200, FOOTER);
    let mut page = page_with(HOST_PAGE, &config, fetch);

    let (header, footer) = mounted(embed(&mut page, &config));
    assert!(header.is_mounted());
    assert!(footer.is_mounted());

    let logo = node(&page, "logo");
    let contact = node(&page, "contact");
    assert_eq!(
        page.document().attribute(logo, "src"),
        Some("https://www.remote.example.org/api/asset-proxy?file=https://www.remote.example.org/_next/image?x=1")
    );
    assert_eq!(
        page.document().attribute(contact, "href"),
        Some("https://www.remote.example.org/en/contact")
    );
    assert_eq!(
        page.document().attribute(node(&page, "terms"), "href"),
        Some("https://www.remote.example.org/en/terms")
    );
    let stylesheets = page.document().elements_by_tag(page.document().root(), "link");
    assert_eq!(
        page.document().attribute(stylesheets[0], "href"),
        Some("https://www.remote.example.org/_next/static/css/header.css")
    );

    let host_link = node(&page, "host-link");
    assert_eq!(page.document().attribute(host_link, "href"), Some("/en/cart"));

    let outcome = page.click(node(&page, "contact-label"));
    assert_eq!(
        outcome,
        ClickOutcome::Intercepted("https://www.remote.example.org/en/contact".to_owned())
    );
    assert_eq!(page.location(), "https://www.remote.example.org/en/contact");
}

#[test]
fn clicks_on_new_context_and_excluded_anchors_are_left_alone() {
    let config = EmbedConfig::default();
    let fetch = MemoryFetch::new().with_page(HEADER_URL, 200, HEADER);
    let mut page = page_with(HOST_PAGE, &config, fetch);
    embed(&mut page, &config);

    assert_eq!(page.click(node(&page, "help")), ClickOutcome::Default);
    assert_eq!(page.click(node(&page, "mail")), ClickOutcome::Default);
    assert_eq!(page.click(node(&page, "host-link")), ClickOutcome::Default);
    assert!(page.navigations().is_empty());
    assert_eq!(page.location(), HOST);
}

#[test]
fn anchors_switched_to_excluded_values_keep_their_default_click() {
    let config = EmbedConfig::default();
    let fetch = MemoryFetch::new().with_page(HEADER_URL, 200, HEADER);
    let mut page = page_with(HOST_PAGE, &config, fetch);
    embed(&mut page, &config);

    let contact = node(&page, "contact");
    for excluded in ["#menu", "javascript:void(0)"] {
        must(page.document_mut().set_attribute(contact, "href", excluded));
        assert_eq!(page.click(contact), ClickOutcome::Default);
        page.flush_mutations();
        assert_eq!(page.click(contact), ClickOutcome::Default);
    }
    assert!(page.navigations().is_empty());
    assert_eq!(page.location(), HOST);
}

#[test]
fn nodes_inserted_later_are_rewritten_in_one_cycle() {
    let config = EmbedConfig::default();
    let fetch = MemoryFetch::new().with_page(HEADER_URL, 200, HEADER);
    let mut page = page_with(HOST_PAGE, &config, fetch);
    embed(&mut page, &config);

    let nav = node(&page, "remote-nav");
    let document = page.document_mut();
    let promo = document.create_element("a");
    let banner = document.create_element("img");
    must(document.set_attribute(promo, "href", "/en/sale"));
    must(document.set_attribute(banner, "srcset", "/_next/static/sale.png 1x, sale@2x.png 2x"));
    must(document.append_child(promo, banner));
    must(document.append_child(nav, promo));

    let stats = page.flush_mutations();
    assert_eq!(stats.failures, 0);
    assert_eq!(
        page.document().attribute(promo, "href"),
        Some("https://www.remote.example.org/en/sale")
    );
    assert_eq!(
        page.document().attribute(banner, "srcset"),
        Some(concat!(
            "https://www.remote.example.org/api/asset-proxy?file=https://www.remote.example.org/_next/static/sale.png 1x, ",
            "https://www.remote.example.org/sale@2x.png 2x",
        ))
    );

    let logo = node(&page, "logo");
    must(page.document_mut().set_attribute(logo, "src", "/img/logo-dark.svg"));
    page.flush_mutations();
    assert_eq!(
        page.document().attribute(logo, "src"),
        Some("https://www.remote.example.org/img/logo-dark.svg")
    );

    assert_eq!(
        page.click(promo),
        ClickOutcome::Intercepted("https://www.remote.example.org/en/sale".to_owned())
    );
}

#[test]
fn a_failed_header_does_not_stop_the_footer() {
    let config = EmbedConfig::default();
    let fetch = MemoryFetch::new()
        .with_failure(HEADER_URL, EmbedError::new("net.connect.refused", "connection refused"))
        .with_page(FOOTER_URL, 200, FOOTER);
    let log = fetch.log();
    let mut page = page_with(HOST_PAGE, &config, fetch);

    let (header, footer) = mounted(embed(&mut page, &config));
    assert_eq!(header, FragmentOutcome::Failed { code: "net.connect.refused" });
    assert!(footer.is_mounted());
    assert_eq!(log.urls(), vec![HEADER_URL.to_owned(), FOOTER_URL.to_owned()]);

    let header_mount = node(&page, "external-header");
    let footer_mount = node(&page, "external-footer");
    assert!(!page.document().has_attribute(header_mount, "hidden"));
    assert!(page.document().has_attribute(footer_mount, "hidden"));

    page.advance(Duration::from_millis(249));
    assert!(page.document().has_attribute(footer_mount, "hidden"));
    page.advance(Duration::from_millis(1));
    assert!(!page.document().has_attribute(footer_mount, "hidden"));
}

#[test]
fn error_statuses_count_as_load_failures() {
    let config = EmbedConfig::default();
    let fetch = MemoryFetch::new().with_page(FOOTER_URL, 200, FOOTER);
    let mut page = page_with(HOST_PAGE, &config, fetch);

    let (header, footer) = mounted(embed(&mut page, &config));
    assert_eq!(header, FragmentOutcome::Failed { code: "embed.fragment.status" });
    assert!(footer.is_mounted());
    assert!(page.document().children(node(&page, "external-header")).is_empty());
}

#[test]
fn missing_mount_points_skip_their_fetch() {
    let config = EmbedConfig::default();
    let fetch = MemoryFetch::new().with_page(HEADER_URL, 200, HEADER);
    let log = fetch.log();
    let mut page = page_with(
        "<body><div id=\"external-header\"></div><main>app</main></body>",
        &config,
        fetch,
    );

    let (header, footer) = mounted(embed(&mut page, &config));
    assert!(header.is_mounted());
    assert_eq!(footer, FragmentOutcome::MountMissing);
    assert_eq!(log.urls(), vec![HEADER_URL.to_owned()]);
}

#[test]
fn embedding_runs_once_per_page() {
    let config = EmbedConfig::default();
    let fetch = MemoryFetch::new()
        .with_page(HEADER_URL, 200, HEADER)
        .with_page(FOOTER_URL, 200, FOOTER);
    let log = fetch.log();
    let mut page = page_with(HOST_PAGE, &config, fetch);

    assert!(matches!(embed(&mut page, &config), EmbedReport::Embedded { .. }));
    assert_eq!(embed(&mut page, &config), EmbedReport::AlreadyEmbedded);
    assert_eq!(log.urls().len(), 2);
    assert_eq!(page.watchers().len(), 2);
}

#[test]
fn invalid_configuration_leaves_the_page_untouched() {
    let config = EmbedConfig::default();
    let mut page = page_with(HOST_PAGE, &config, MemoryFetch::new());
    let mut broken = EmbedConfig::default();
    broken.header_mount_id.clear();

    assert!(matches!(embed(&mut page, &broken), EmbedReport::Rejected { .. }));
    assert!(page.watchers().is_empty());
    assert!(matches!(embed(&mut page, &config), EmbedReport::Embedded { .. }));
}

const RUNTIME_HEADER: &str = concat!(
    "<nav id=\"remote-nav\"><a href=\"/en\">Home</a></nav>",
    "<script src=\"/_next/static/chunks/runtime.js\"></script>",
    "<script id=\"__NEXT_DATA__\" type=\"application/json\">{\"page\":\"/header\",\"locale\":\"en\"}</script>",
    "<script>window.hydrated = true;</script>",
    "<script src=\"https://cdn.example/analytics.js\"></script>",
);

const RUNTIME_BUNDLE: &str = r#"
window.next = {
  router: {
    pushed: [],
    push: function (url) { this.pushed.push(String(url)); return Promise.resolve(true); },
    replace: function (url) { this.pushed.push("replace:" + String(url)); return Promise.resolve(true); }
  }
};
window.locale = JSON.parse(document.getElementById("__NEXT_DATA__").textContent).locale;
fetch("/api/search/suggest?q=so")
  .then(function (response) { return response.text(); })
  .then(function (text) { window.suggestions = text; });
"#;

fn runtime_page(config: &EmbedConfig) -> (Page, gf_net::FetchLog) {
    let bundle_url = format!("{REMOTE}/api/asset-proxy?file={REMOTE}/_next/static/chunks/runtime.js");
    let fetch = MemoryFetch::new()
        .with_page(HEADER_URL, 200, RUNTIME_HEADER)
        .with_response(
            &bundle_url,
            FetchResponse::new(bundle_url.as_str(), 200, RUNTIME_BUNDLE)
                .with_header("Content-Type", "application/javascript"),
        )
        .with_response(
            "https://www.remote.example.org/api/search/suggest?q=so",
            FetchResponse::new("https://www.remote.example.org/api/search/suggest?q=so", 200, "socks,sofas"),
        );
    let log = fetch.log();
    (page_with(HOST_PAGE, config, fetch), log)
}

#[test]
fn only_support_scripts_and_data_are_reanimated() {
    let config = EmbedConfig::default();
    let (mut page, log) = runtime_page(&config);

    let report = embed(&mut page, &config);
    let EmbedReport::Embedded { header, scripts, .. } = report else {
        panic!("unexpected report {report:?}");
    };
    assert!(matches!(
        header,
        FragmentOutcome::Mounted {
            scripts_kept: 2,
            scripts_discarded: 2,
            ..
        }
    ));
    assert_eq!(scripts.executed, 1);
    assert_eq!(scripts.data_payloads, 1);
    assert_eq!(scripts.failed, 0);
    assert!(scripts.router_patched);

    assert_eq!(eval(&mut page, "typeof window.hydrated"), "undefined");
    assert_eq!(eval(&mut page, "window.locale"), "en");
    assert_eq!(eval(&mut page, "window.suggestions"), "socks,sofas");
    assert!(!log.urls().iter().any(|url| url.contains("analytics")));
    assert!(log
        .urls()
        .contains(&"https://www.remote.example.org/api/search/suggest?q=so".to_owned()));
}

#[test]
fn router_calls_from_the_runtime_are_routed() {
    let config = EmbedConfig::default();
    let (mut page, _log) = runtime_page(&config);
    embed(&mut page, &config);
    assert!(page.registry().is_router_patched());

    must(page.run_inline_script("next.router.push('/en/header');"));
    assert!(page.navigations().is_empty());
    assert_eq!(page.location(), HOST);

    must(page.run_inline_script("next.router.push('?tab=2');"));
    assert!(page.navigations().is_empty());
    assert_eq!(page.location(), "https://host.example/en?tab=2");

    must(page.run_inline_script("next.router.push('/checkout');"));
    assert_eq!(eval(&mut page, "next.router.pushed.join(',')"), "https://host.example/checkout");

    must(page.run_inline_script("next.router.replace({ pathname: '/en/account', query: { from: 'nav' } });"));
    assert_eq!(
        page.navigations(),
        ["https://www.remote.example.org/en/account?from=nav".to_owned()]
    );
}

#[test]
fn blocked_calls_reject_inside_the_runtime() {
    let config = EmbedConfig::default();
    let (mut page, log) = runtime_page(&config);
    embed(&mut page, &config);
    let before = log.urls().len();

    must(page.run_inline_script(
        "window.hmr = 'pending'; fetch('/_next/webpack-hmr').then(function () { hmr = 'open'; }, function (e) { hmr = e.name; });",
    ));
    assert_eq!(eval(&mut page, "hmr"), "TypeError");
    assert_eq!(log.urls().len(), before);
}

#[test]
fn shadow_isolation_keeps_fragments_out_of_the_host_tree() {
    let config = EmbedConfig::default().with_isolation(IsolationMode::Shadow);
    let fetch = MemoryFetch::new()
        .with_page(HEADER_URL, 200, HEADER)
        .with_page(FOOTER_URL, 200, FOOTER);
    let mut page = page_with(HOST_PAGE, &config, fetch);

    let (header, _) = mounted(embed(&mut page, &config));
    assert!(header.is_mounted());

    let mount = node(&page, "external-header");
    assert!(page.document().children(mount).is_empty());
    assert!(page.document().element_by_id("contact").is_none());

    let shadow = match page.document().shadow_root(mount) {
        Some(value) => value,
        None => panic!("no shadow root"),
    };
    let anchors = page.document().elements_by_tag(shadow, "a");
    let contact = anchors
        .iter()
        .copied()
        .find(|anchor| page.document().attribute(*anchor, "id") == Some("contact"));
    let contact = match contact {
        Some(value) => value,
        None => panic!("contact anchor missing from shadow tree"),
    };

    let label = page.document().children(contact)[0];
    assert_eq!(
        page.click(label),
        ClickOutcome::Intercepted("https://www.remote.example.org/en/contact".to_owned())
    );
}
