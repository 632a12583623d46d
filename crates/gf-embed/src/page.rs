//! The host page: document, location, clock, watchers, script session, and the
//! interceptor every outbound call goes through.

use crate::watcher::BatchStats;
use crate::watcher::CLICK_LISTENER;
use crate::watcher::Watcher;
use crate::watcher::anchor_click_target;
use core::time::Duration;
use gf_core::config::DATA_SCRIPT_ID;
use gf_core::EmbedConfig;
use gf_core::EmbedError;
use gf_core::EmbedResult;
use gf_dom::Document;
use gf_dom::NodeId;
use gf_html::parse_document;
use gf_intercept::InterceptorRegistry;
use gf_intercept::NavigationOutcome;
use gf_net::CredentialsMode;
use gf_net::Fetch;
use gf_net::FetchRequest;
use gf_net::Method;
use gf_net::TargetUrl;
use gf_script::NavigationMethod;
use gf_script::NavigationSource;
use gf_script::RouterPatch;
use gf_script::RuntimeCall;
use gf_script::ScriptConfig;
use gf_script::ScriptSession;
use gf_script::ScriptSource;
use tracing::debug;
use tracing::info;
use tracing::warn;

const MAX_FLUSH_ROUNDS: usize = 32;
const MAX_CALL_ROUNDS: usize = 64;
const MAX_SCRIPT_ROUNDS: usize = 16;
const MAX_CLOCK_STEPS: usize = 1_024;

/// What a click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Default action prevented; the page navigated to this URL.
    Intercepted(String),
    /// Nothing handled the click.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageTask {
    Reveal(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timer {
    id: u64,
    due: Duration,
    task: PageTask,
}

/// Counters for one pass over the pending script queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptRun {
    pub executed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub data_payloads: usize,
    pub router_patched: bool,
}

pub struct Page {
    document: Document,
    location: String,
    history: Vec<String>,
    navigations: Vec<String>,
    now: Duration,
    timers: Vec<Timer>,
    next_timer: u64,
    watchers: Vec<Watcher>,
    script: ScriptSession,
    registry: InterceptorRegistry,
    data_script_id: String,
    inline_scripts: usize,
    embedded: bool,
}

impl core::fmt::Debug for Page {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Page")
            .field("location", &self.location)
            .field("nodes", &self.document.node_count())
            .field("now", &self.now)
            .field("timers", &self.timers.len())
            .field("watchers", &self.watchers.len())
            .field("embedded", &self.embedded)
            .finish()
    }
}

impl Page {
    pub fn new(document: Document, location: &str, registry: InterceptorRegistry) -> EmbedResult<Self> {
        let location = TargetUrl::parse(location)?.as_str().to_owned();
        let mut script = ScriptSession::new(ScriptConfig::default())?;
        script.set_location(&location)?;

        Ok(Self {
            document,
            history: vec![location.clone()],
            location,
            navigations: Vec::new(),
            now: Duration::ZERO,
            timers: Vec::new(),
            next_timer: 1,
            watchers: Vec::new(),
            script,
            registry,
            data_script_id: DATA_SCRIPT_ID.to_owned(),
            inline_scripts: 0,
            embedded: false,
        })
    }

    /// Parses a host page served at `location` and installs `fetch` as its fetch primitive.
    pub fn from_html(
        html: &str,
        location: &str,
        config: &EmbedConfig,
        fetch: Box<dyn Fetch>,
    ) -> EmbedResult<Self> {
        let host = TargetUrl::parse(location)?;
        let mut registry = InterceptorRegistry::new(config, &host.origin())?;
        registry.install_fetch(fetch);

        let mut page = Self::new(parse_document(html)?, host.as_str(), registry)?;
        page.data_script_id = config.data_script_id.clone();
        Ok(page)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Session history, oldest first; the last entry is the current one.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Full navigations the page performed, in order.
    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn registry(&self) -> &InterceptorRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut InterceptorRegistry {
        &mut self.registry
    }

    pub fn script_mut(&mut self) -> &mut ScriptSession {
        &mut self.script
    }

    pub fn watchers(&self) -> &[Watcher] {
        &self.watchers
    }

    pub(crate) fn add_watcher(&mut self, watcher: Watcher) {
        self.watchers.push(watcher);
    }

    /// Disconnects every watcher; returns how many were active.
    pub fn stop_watching(&mut self) -> usize {
        let stopped = self.watchers.len();
        for watcher in self.watchers.drain(..) {
            watcher.stop(&mut self.document);
        }
        stopped
    }

    pub(crate) fn is_embedded(&self) -> bool {
        self.embedded
    }

    pub(crate) fn mark_embedded(&mut self) {
        self.embedded = true;
    }

    /// Delivers pending mutation batches to their watchers until none remain.
    pub fn flush_mutations(&mut self) -> BatchStats {
        let mut total = BatchStats::default();
        for _ in 0..MAX_FLUSH_ROUNDS {
            let mut delivered = false;
            for watcher in &self.watchers {
                let records = self.document.take_records(watcher.handle());
                if records.is_empty() {
                    continue;
                }
                delivered = true;
                let batch = watcher.process(&mut self.document, records);
                total.records = total.records.saturating_add(batch.records);
                total.rewritten = total.rewritten.saturating_add(batch.rewritten);
                total.failures = total.failures.saturating_add(batch.failures);
            }
            if !delivered {
                return total;
            }
        }

        if self.document.has_pending_records() {
            warn!(rounds = MAX_FLUSH_ROUNDS, "mutation delivery did not settle");
        }
        total
    }

    /// Dispatches a click on `target` along its composed path.
    pub fn click(&mut self, target: NodeId) -> ClickOutcome {
        let mut current = Some(target);
        while let Some(node) = current {
            if self.document.has_listener(node, CLICK_LISTENER) {
                let destination = self
                    .watchers
                    .iter()
                    .find(|watcher| watcher.covers(&self.document, node))
                    .and_then(|watcher| anchor_click_target(&self.document, node, watcher.rewriter()));
                return match destination {
                    Some(url) => {
                        self.navigate(&url);
                        ClickOutcome::Intercepted(url)
                    }
                    None => ClickOutcome::Default,
                };
            }
            current = self.document.composed_parent(node);
        }
        ClickOutcome::Default
    }

    /// Moves the page to `url` as a full navigation.
    pub fn navigate(&mut self, url: &str) {
        info!(from = %self.location, to = url, "page navigation");
        self.navigations.push(url.to_owned());
        self.history.push(url.to_owned());
        self.set_location(url);
    }

    fn update_history(&mut self, method: NavigationMethod, url: &str) {
        debug!(method = method.as_str(), url, "same-page history update");
        match (method, self.history.last_mut()) {
            (NavigationMethod::Replace, Some(current)) => *current = url.to_owned(),
            _ => self.history.push(url.to_owned()),
        }
        self.set_location(url);
    }

    fn set_location(&mut self, url: &str) {
        self.location = url.to_owned();
        if let Err(error) = self.script.set_location(url) {
            warn!(code = error.code, %error, "failed to mirror location into the script session");
        }
    }

    pub(crate) fn schedule(&mut self, delay: Duration, task: PageTask) -> u64 {
        let id = self.next_timer;
        self.next_timer = self.next_timer.saturating_add(1);
        self.timers.push(Timer {
            id,
            due: self.now.saturating_add(delay),
            task,
        });
        id
    }

    pub(crate) fn run_task(&mut self, task: PageTask) {
        match task {
            PageTask::Reveal(element) => {
                if let Err(error) = self.document.remove_attribute(element, "hidden") {
                    warn!(element, code = error.code, %error, "failed to reveal mount point");
                } else {
                    debug!(element, "revealed mount point");
                }
            }
        }
    }

    /// Moves the clock forward, firing page and script timers in due order.
    ///
    /// Returns the number of timer callbacks that ran.
    pub fn advance(&mut self, by: Duration) -> usize {
        let target = self.now.saturating_add(by);
        let mut fired = 0_usize;

        for _ in 0..MAX_CLOCK_STEPS {
            let page_due = self
                .timers
                .iter()
                .filter(|timer| timer.due <= target)
                .min_by_key(|timer| (timer.due, timer.id))
                .map(|timer| (timer.due, timer.id));
            let script_due = self
                .next_script_due()
                .filter(|due| *due <= target);

            match (page_due, script_due) {
                (None, None) => break,
                (Some((due, id)), script) if script.is_none_or(|other| due <= other) => {
                    self.now = self.now.max(due);
                    if let Some(position) = self.timers.iter().position(|timer| timer.id == id) {
                        let timer = self.timers.remove(position);
                        self.run_task(timer.task);
                        fired = fired.saturating_add(1);
                    }
                }
                (_, Some(due)) => {
                    self.now = self.now.max(due);
                    fired = fired.saturating_add(self.run_script_timers());
                    self.process_runtime_calls();
                    self.flush_mutations();
                }
                (Some(_), None) => break,
            }
        }

        self.now = target;
        fired.saturating_add(self.run_script_timers())
    }

    /// Advances until no page or script timer is left.
    pub fn run_until_idle(&mut self) -> usize {
        let mut fired = 0_usize;
        for _ in 0..MAX_CLOCK_STEPS {
            let page_due = self.timers.iter().map(|timer| timer.due).min();
            let next = match (page_due, self.next_script_due()) {
                (Some(page), Some(script)) => page.min(script),
                (Some(due), None) | (None, Some(due)) => due,
                (None, None) => return fired,
            };
            fired = fired.saturating_add(self.advance(next.saturating_sub(self.now)));
        }

        warn!(steps = MAX_CLOCK_STEPS, "timers still pending after the step limit");
        fired
    }

    fn next_script_due(&mut self) -> Option<Duration> {
        match self.script.next_timer_due() {
            Ok(due) => due.map(Duration::from_millis),
            Err(error) => {
                warn!(code = error.code, %error, "failed to read script timers");
                None
            }
        }
    }

    fn run_script_timers(&mut self) -> usize {
        let now_ms = u64::try_from(self.now.as_millis()).unwrap_or(u64::MAX);
        match self.script.run_timers(now_ms) {
            Ok(ran) => ran,
            Err(error) => {
                warn!(code = error.code, %error, "script timer callback failed");
                0
            }
        }
    }

    /// Executes every connected script queued by the document, in insertion order.
    ///
    /// Data payloads in a batch are registered first and never executed, and
    /// non-classic script types are skipped. After each executed script the
    /// runtime router is patched if it has appeared.
    pub fn run_pending_scripts(&mut self) -> ScriptRun {
        let mut run = ScriptRun::default();

        for _ in 0..MAX_SCRIPT_ROUNDS {
            let pending = self.document.take_pending_scripts();
            if pending.is_empty() {
                break;
            }

            let (data, code): (Vec<NodeId>, Vec<NodeId>) =
                pending.into_iter().partition(|script| self.is_data_script(*script));
            for script in data {
                self.register_data_script(script, &mut run);
            }
            for script in code {
                self.run_script_element(script, &mut run);
            }
        }

        run
    }

    fn is_data_script(&self, script: NodeId) -> bool {
        self.document.attribute(script, "id") == Some(self.data_script_id.as_str())
            || self
                .document
                .attribute(script, "type")
                .is_some_and(|kind| kind.trim().eq_ignore_ascii_case("application/json"))
    }

    fn register_data_script(&mut self, script: NodeId, run: &mut ScriptRun) {
        let name = self
            .document
            .attribute(script, "id")
            .unwrap_or(self.data_script_id.as_str())
            .to_owned();
        let payload = self.document.text_content(script);
        match self.script.register_data(&name, &payload) {
            Ok(()) => run.data_payloads = run.data_payloads.saturating_add(1),
            Err(error) => {
                run.failed = run.failed.saturating_add(1);
                warn!(id = %name, code = error.code, %error, "failed to register data payload");
            }
        }
    }

    fn run_script_element(&mut self, script: NodeId, run: &mut ScriptRun) {
        let script_type = self
            .document
            .attribute(script, "type")
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if !is_classic_script(&script_type) {
            debug!(script, kind = %script_type, "skipping non-classic script");
            run.skipped = run.skipped.saturating_add(1);
            return;
        }

        let source = match self.document.attribute(script, "src").map(str::to_owned) {
            Some(src) => match self.load_script(&src) {
                Ok(source) => source,
                Err(error) => {
                    run.failed = run.failed.saturating_add(1);
                    warn!(src = %src, code = error.code, %error, "failed to load script");
                    return;
                }
            },
            None => {
                self.inline_scripts = self.inline_scripts.saturating_add(1);
                ScriptSource::new(
                    format!("inline:{}", self.inline_scripts),
                    self.document.text_content(script),
                )
            }
        };

        match self.script.execute(&source) {
            Ok(()) => run.executed = run.executed.saturating_add(1),
            Err(error) if error.code == "script.source.oversized" => {
                run.skipped = run.skipped.saturating_add(1);
                debug!(origin = %source.origin, %error, "skipped oversized script");
            }
            Err(error) => {
                run.failed = run.failed.saturating_add(1);
                warn!(origin = %source.origin, code = error.code, %error, "script failed");
            }
        }

        self.process_runtime_calls();
        if self.try_patch_router() {
            run.router_patched = true;
        }
    }

    fn load_script(&mut self, src: &str) -> EmbedResult<ScriptSource> {
        let url = self.resolve(src)?;
        let response = self.registry.fetch(&FetchRequest::get(url.as_str()))?;
        if !response.is_success() {
            return Err(EmbedError::new(
                "embed.script.status",
                format!("script `{url}` returned HTTP {}", response.status),
            ));
        }
        Ok(ScriptSource::new(url, response.text()))
    }

    /// Executes inline code as if a script element carrying it had been inserted.
    pub fn run_inline_script(&mut self, code: &str) -> EmbedResult<()> {
        self.inline_scripts = self.inline_scripts.saturating_add(1);
        let source = ScriptSource::new(format!("inline:{}", self.inline_scripts), code);
        let result = self.script.execute(&source);
        self.process_runtime_calls();
        self.try_patch_router();
        result
    }

    /// Wraps the runtime router once it exists; true when this call patched it.
    fn try_patch_router(&mut self) -> bool {
        if self.registry.is_router_patched() {
            return false;
        }

        match self.script.patch_router() {
            Ok(RouterPatch::Patched) => {
                self.registry.mark_router_patched();
                info!("runtime router now reports through the interceptor");
                true
            }
            Ok(RouterPatch::AlreadyPatched) => {
                self.registry.mark_router_patched();
                false
            }
            Ok(RouterPatch::Absent) => false,
            Err(error) => {
                warn!(code = error.code, %error, "failed to patch runtime router");
                false
            }
        }
    }

    /// Carries out the fetch and navigation calls the runtime queued, including any
    /// queued while settling earlier fetches. Returns how many calls were handled.
    pub fn process_runtime_calls(&mut self) -> usize {
        let mut handled = 0_usize;
        for _ in 0..MAX_CALL_ROUNDS {
            let calls = match self.script.drain_calls() {
                Ok(calls) => calls,
                Err(error) => {
                    warn!(code = error.code, %error, "failed to drain runtime calls");
                    return handled;
                }
            };
            if calls.is_empty() {
                return handled;
            }

            for call in calls {
                handled = handled.saturating_add(1);
                match call {
                    RuntimeCall::Fetch {
                        id,
                        url,
                        method,
                        credentials,
                        body,
                    } => self.handle_fetch(id, &url, &method, credentials.as_deref(), body),
                    RuntimeCall::Navigate { source, method, url } => {
                        self.handle_navigation(source, method, &url);
                    }
                }
            }
        }

        warn!(rounds = MAX_CALL_ROUNDS, "runtime calls did not settle");
        handled
    }

    fn handle_fetch(
        &mut self,
        id: u64,
        url: &str,
        method: &str,
        credentials: Option<&str>,
        body: Option<String>,
    ) {
        let mut request = FetchRequest::get(self.resolve(url).unwrap_or_else(|_| url.to_owned()))
            .with_method(Method::parse(method).unwrap_or_default());
        if let Some(mode) = credentials.and_then(CredentialsMode::parse) {
            request = request.with_credentials(mode);
        }
        if let Some(body) = body {
            request = request.with_body(body);
        }

        let settled = match self.registry.fetch(&request) {
            Ok(response) => {
                self.script
                    .settle_fetch(id, response.status, &response.url, &response.text())
            }
            Err(error) => {
                debug!(id, url, code = error.code, %error, "runtime fetch failed");
                self.script.fail_fetch(id, &error.to_string())
            }
        };
        if let Err(error) = settled {
            warn!(id, code = error.code, %error, "failed to settle runtime fetch");
        }
    }

    fn handle_navigation(&mut self, source: NavigationSource, method: NavigationMethod, url: &str) {
        match self.registry.route_navigation(url, &self.location) {
            NavigationOutcome::Swallowed => {
                debug!(url, "navigation swallowed");
            }
            NavigationOutcome::Navigate(target) => self.navigate(&target),
            NavigationOutcome::HistoryUpdate(target) => self.update_history(method, &target),
            NavigationOutcome::Delegate(target) => match source {
                NavigationSource::Router => match self.script.delegate_navigation(method, &target) {
                    Ok(true) => {}
                    Ok(false) => debug!(url = %target, "router has no original method to delegate to"),
                    Err(error) => warn!(url = %target, code = error.code, %error, "delegated navigation failed"),
                },
                NavigationSource::History => self.update_history(method, &target),
                NavigationSource::Location => self.navigate(&target),
            },
        }
    }

    fn resolve(&self, url: &str) -> EmbedResult<String> {
        Ok(TargetUrl::parse(&self.location)?.join(url)?.as_str().to_owned())
    }
}

fn is_classic_script(script_type: &str) -> bool {
    matches!(
        script_type,
        "" | "text/javascript" | "application/javascript" | "application/ecmascript" | "text/ecmascript"
    )
}
