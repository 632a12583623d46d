//! Script engine session hosting the embedded runtime.
//!
//! One [`ScriptSession`] lives as long as the page. Scripts run against a small
//! browser-shaped global environment; every outbound call they make lands in an
//! outbox the host drains with [`ScriptSession::drain_calls`].

mod bootstrap;
mod calls;

use bootstrap::BOOTSTRAP_ENV;
use bootstrap::DRAIN_OUTBOX;
use bootstrap::NEXT_TIMER_DUE;
use bootstrap::PATCH_ROUTER;
use boa_engine::Context;
use boa_engine::JsValue;
use boa_engine::Source;
use core::fmt;
use gf_core::EmbedError;
use gf_core::EmbedResult;
use tracing::debug;

pub use calls::NavigationMethod;
pub use calls::NavigationSource;
pub use calls::RuntimeCall;

/// Script payload to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    /// Where the code came from, for diagnostics (`inline:<n>` or a URL).
    pub origin: String,
    pub source: String,
}

impl ScriptSource {
    pub fn new(origin: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            source: source.into(),
        }
    }
}

/// Runtime hardening knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptConfig {
    /// Preferred script-size budget in bytes; larger scripts still run up to a hard cap.
    pub max_script_bytes: usize,
    pub recursion_limit: usize,
    pub stack_size_limit: usize,
    pub loop_iteration_limit: u64,
    /// Timer callbacks run per clock advance.
    pub timer_batch_limit: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            max_script_bytes: 2 * 1024 * 1024,
            recursion_limit: 512,
            stack_size_limit: 10 * 1024,
            loop_iteration_limit: 1_000_000,
            timer_batch_limit: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptStats {
    pub executed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Result of trying to wrap the runtime's router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterPatch {
    /// No `next.router` with `push`/`replace` exists yet.
    Absent,
    Patched,
    AlreadyPatched,
}

pub struct ScriptSession {
    context: Context,
    config: ScriptConfig,
    stats: ScriptStats,
}

impl fmt::Debug for ScriptSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptSession")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ScriptSession {
    pub fn new(config: ScriptConfig) -> EmbedResult<Self> {
        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_recursion_limit(config.recursion_limit);
        context
            .runtime_limits_mut()
            .set_stack_size_limit(config.stack_size_limit);
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(config.loop_iteration_limit);
        context
            .eval(Source::from_bytes(BOOTSTRAP_ENV.as_bytes()))
            .map_err(|error| EmbedError::new("script.bootstrap.failed", error.to_string()))?;

        Ok(Self {
            context,
            config,
            stats: ScriptStats::default(),
        })
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    pub fn stats(&self) -> ScriptStats {
        self.stats
    }

    /// Runs one script, then any promise jobs it queued.
    pub fn execute(&mut self, script: &ScriptSource) -> EmbedResult<()> {
        let bytes = script.source.len();
        if bytes > hard_script_byte_cap(self.config.max_script_bytes) {
            self.stats.skipped = self.stats.skipped.saturating_add(1);
            return Err(EmbedError::new(
                "script.source.oversized",
                format!("`{}` is {bytes} bytes, over the hard cap", script.origin),
            ));
        }
        if bytes > self.config.max_script_bytes {
            debug!(origin = %script.origin, bytes, "script over preferred size; running anyway");
        }

        match self.eval(&script.source) {
            Ok(_) => {
                self.stats.executed = self.stats.executed.saturating_add(1);
                Ok(())
            }
            Err(error) => {
                self.stats.failed = self.stats.failed.saturating_add(1);
                Err(EmbedError::new(
                    error.code,
                    format!("`{}`: {}", script.origin, error.message),
                ))
            }
        }
    }

    /// Evaluates an expression and renders the result with `String(...)` semantics.
    pub fn evaluate_string(&mut self, expression: &str) -> EmbedResult<String> {
        let value = self.eval(expression)?;
        value
            .to_string(&mut self.context)
            .map(|text| text.to_std_string_escaped())
            .map_err(|error| EmbedError::new("script.value.unconvertible", error.to_string()))
    }

    pub fn set_location(&mut self, href: &str) -> EmbedResult<()> {
        let source = format!("globalThis.__graft_set_location({});", js_string_literal(href)?);
        self.eval(&source).map(|_| ())
    }

    pub fn location_href(&mut self) -> EmbedResult<String> {
        self.evaluate_string("String(globalThis.location.href)")
    }

    /// Exposes a JSON payload without executing it. Identifier-shaped ids also become globals.
    pub fn register_data(&mut self, id: &str, json: &str) -> EmbedResult<()> {
        let payload: serde_json::Value = serde_json::from_str(json).map_err(|error| {
            EmbedError::new(
                "script.data.invalid",
                format!("payload `{id}` is not JSON: {error}"),
            )
        })?;
        let encoded = serde_json::to_string(&payload).map_err(|error| {
            EmbedError::new("script.data.invalid", format!("payload `{id}`: {error}"))
        })?;

        let key = js_string_literal(id)?;
        let mut source = format!(
            "globalThis.__graft_data[{key}] = JSON.parse({});",
            js_string_literal(&encoded)?
        );
        if is_identifier(id) {
            source.push_str(&format!(" globalThis[{key}] = globalThis.__graft_data[{key}];"));
        }
        self.eval(&source)?;
        debug!(id, bytes = json.len(), "registered data payload");
        Ok(())
    }

    /// Takes every call queued since the last drain, in call order.
    pub fn drain_calls(&mut self) -> EmbedResult<Vec<RuntimeCall>> {
        let raw = self.evaluate_string(DRAIN_OUTBOX)?;
        serde_json::from_str(&raw)
            .map_err(|error| EmbedError::new("script.outbox.malformed", error.to_string()))
    }

    /// Resolves a pending `fetch` promise; `false` when `id` is unknown or already settled.
    pub fn settle_fetch(&mut self, id: u64, status: u16, url: &str, body: &str) -> EmbedResult<bool> {
        let source = format!(
            "globalThis.__graft_settle({id}, {status}, {}, {})",
            js_string_literal(url)?,
            js_string_literal(body)?
        );
        Ok(self.eval(&source)?.as_boolean().unwrap_or(false))
    }

    /// Rejects a pending `fetch` promise with a `TypeError`, as a network failure would.
    pub fn fail_fetch(&mut self, id: u64, message: &str) -> EmbedResult<bool> {
        let source = format!(
            "globalThis.__graft_fail({id}, {})",
            js_string_literal(message)?
        );
        Ok(self.eval(&source)?.as_boolean().unwrap_or(false))
    }

    /// Moves the script clock to `now_ms` and runs due timers; returns how many ran.
    pub fn run_timers(&mut self, now_ms: u64) -> EmbedResult<usize> {
        let source = format!(
            "globalThis.__graft_run_timers({now_ms}, {})",
            self.config.timer_batch_limit
        );
        let ran = self.eval(&source)?.as_number().unwrap_or(0.0);
        Ok(ran.max(0.0) as usize)
    }

    pub fn next_timer_due(&mut self) -> EmbedResult<Option<u64>> {
        let due = self.eval(NEXT_TIMER_DUE)?.as_number().unwrap_or(-1.0);
        Ok((due >= 0.0).then_some(due as u64))
    }

    /// Wraps `next.router.push`/`replace` so they enqueue navigation calls.
    pub fn patch_router(&mut self) -> EmbedResult<RouterPatch> {
        let outcome = match self.evaluate_string(PATCH_ROUTER)?.as_str() {
            "patched" => RouterPatch::Patched,
            "already" => RouterPatch::AlreadyPatched,
            _ => RouterPatch::Absent,
        };
        debug!(?outcome, "router patch attempted");
        Ok(outcome)
    }

    /// Invokes the router method saved by [`Self::patch_router`].
    pub fn delegate_navigation(&mut self, method: NavigationMethod, url: &str) -> EmbedResult<bool> {
        let source = format!(
            "globalThis.__graft_delegate({}, {})",
            js_string_literal(method.as_str())?,
            js_string_literal(url)?
        );
        Ok(self.eval(&source)?.as_boolean().unwrap_or(false))
    }

    fn eval(&mut self, source: &str) -> EmbedResult<JsValue> {
        let value = self
            .context
            .eval(Source::from_bytes(source.as_bytes()))
            .map_err(|error| EmbedError::new("script.eval.failed", error.to_string()))?;
        self.context.run_jobs();
        Ok(value)
    }
}

fn js_string_literal(input: &str) -> EmbedResult<String> {
    serde_json::to_string(input)
        .map_err(|error| EmbedError::new("script.literal.encode_failed", error.to_string()))
}

fn is_identifier(input: &str) -> bool {
    let mut chars = input.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$')
}

fn hard_script_byte_cap(preferred: usize) -> usize {
    let scaled = preferred.saturating_mul(4);
    let bounded = scaled.min(16 * 1024 * 1024);
    bounded.max(preferred)
}

#[cfg(test)]
mod tests {
    use super::NavigationMethod;
    use super::NavigationSource;
    use super::RouterPatch;
    use super::RuntimeCall;
    use super::ScriptConfig;
    use super::ScriptSession;
    use super::ScriptSource;

    fn session() -> ScriptSession {
        match ScriptSession::new(ScriptConfig::default()) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    fn run(session: &mut ScriptSession, source: &str) {
        if let Err(error) = session.execute(&ScriptSource::new("inline:test", source)) {
            panic!("{error}");
        }
    }

    fn read(session: &mut ScriptSession, expression: &str) -> String {
        match session.evaluate_string(expression) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    fn drain(session: &mut ScriptSession) -> Vec<RuntimeCall> {
        match session.drain_calls() {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn fetch_is_queued_and_settled_by_the_host() {
        let mut session = session();
        run(
            &mut session,
            "fetch('/api/session', { credentials: 'include' })
               .then(function (response) { return response.json(); })
               .then(function (data) { globalThis.user = data.user; });",
        );

        let calls = drain(&mut session);
        assert_eq!(
            calls,
            vec![RuntimeCall::Fetch {
                id: 1,
                url: "/api/session".to_owned(),
                method: "GET".to_owned(),
                credentials: Some("include".to_owned()),
                body: None,
            }]
        );
        assert!(drain(&mut session).is_empty());

        let settled = session.settle_fetch(1, 200, "https://x.example/api/session", r#"{"user":"ada"}"#);
        assert!(matches!(settled, Ok(true)));
        assert_eq!(read(&mut session, "String(globalThis.user)"), "ada");
        assert!(matches!(session.settle_fetch(1, 200, "", ""), Ok(false)));
    }

    #[test]
    fn failed_fetch_rejects_the_promise() {
        let mut session = session();
        run(
            &mut session,
            "fetch('/api/search/suggest?q=a').catch(function (error) { globalThis.failure = error.message; });",
        );
        assert!(matches!(session.fail_fetch(1, "blocked"), Ok(true)));
        assert_eq!(read(&mut session, "String(globalThis.failure)"), "blocked");
    }

    #[test]
    fn history_and_location_calls_reach_the_outbox() {
        let mut session = session();
        run(
            &mut session,
            "history.pushState({}, '', '/en/products'); history.replaceState(null, ''); location.assign('/en');",
        );
        assert_eq!(
            drain(&mut session),
            vec![
                RuntimeCall::Navigate {
                    source: NavigationSource::History,
                    method: NavigationMethod::Push,
                    url: "/en/products".to_owned(),
                },
                RuntimeCall::Navigate {
                    source: NavigationSource::Location,
                    method: NavigationMethod::Push,
                    url: "/en".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn timers_follow_the_host_clock() {
        let mut session = session();
        run(
            &mut session,
            "globalThis.order = []; setTimeout(function () { order.push('late'); }, 100); setTimeout(function () { order.push('soon'); }, 10);",
        );
        assert!(matches!(session.next_timer_due(), Ok(Some(10))));
        assert!(matches!(session.run_timers(50), Ok(1)));
        assert_eq!(read(&mut session, "order.join(',')"), "soon");
        assert!(matches!(session.run_timers(100), Ok(1)));
        assert_eq!(read(&mut session, "order.join(',')"), "soon,late");
        assert!(matches!(session.next_timer_due(), Ok(None)));
    }

    #[test]
    fn router_is_patched_once_and_delegates_to_the_original() {
        let mut session = session();
        assert!(matches!(session.patch_router(), Ok(RouterPatch::Absent)));

        run(
            &mut session,
            "globalThis.visited = [];
             globalThis.next = { router: {
               push: function (url) { visited.push('push:' + url); return Promise.resolve(true); },
               replace: function (url) { visited.push('replace:' + url); return Promise.resolve(true); }
             } };",
        );
        assert!(matches!(session.patch_router(), Ok(RouterPatch::Patched)));
        assert!(matches!(session.patch_router(), Ok(RouterPatch::AlreadyPatched)));

        run(&mut session, "next.router.push({ pathname: '/en/search', query: { q: 'bolts' } });");
        assert_eq!(
            drain(&mut session),
            vec![RuntimeCall::Navigate {
                source: NavigationSource::Router,
                method: NavigationMethod::Push,
                url: "/en/search?q=bolts".to_owned(),
            }]
        );
        assert_eq!(read(&mut session, "visited.length"), "0");

        assert!(matches!(
            session.delegate_navigation(NavigationMethod::Replace, "/elsewhere"),
            Ok(true)
        ));
        assert_eq!(read(&mut session, "visited.join(',')"), "replace:/elsewhere");
    }

    #[test]
    fn registered_data_is_visible_without_execution() {
        let mut session = session();
        let registered = session.register_data("__NEXT_DATA__", r#"{"buildId":"b1","props":{}}"#);
        assert!(registered.is_ok());
        assert_eq!(read(&mut session, "__NEXT_DATA__.buildId"), "b1");
        assert_eq!(
            read(&mut session, "document.getElementById('__NEXT_DATA__') !== null"),
            "true"
        );

        let invalid = session.register_data("broken", "{not json");
        assert!(matches!(invalid, Err(error) if error.code == "script.data.invalid"));
    }

    #[test]
    fn location_mirrors_the_host() {
        let mut session = session();
        assert!(session.set_location("https://host.example/en/shop?page=2#top").is_ok());
        assert_eq!(read(&mut session, "location.pathname"), "/en/shop");
        assert_eq!(read(&mut session, "location.search"), "?page=2");
        assert!(matches!(
            session.location_href(),
            Ok(href) if href == "https://host.example/en/shop?page=2#top"
        ));
    }

    #[test]
    fn script_errors_are_counted_and_reported() {
        let mut session = session();
        let result = session.execute(&ScriptSource::new("inline:bad", "throw new Error('boom');"));
        assert!(matches!(result, Err(error) if error.code == "script.eval.failed" && error.message.contains("inline:bad")));
        assert_eq!(session.stats().failed, 1);
    }

    #[test]
    fn oversized_scripts_are_skipped() {
        let mut session = match ScriptSession::new(ScriptConfig {
            max_script_bytes: 16,
            ..ScriptConfig::default()
        }) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        };
        let result = session.execute(&ScriptSource::new("inline:big", "var x = 1;".repeat(10)));
        assert!(matches!(result, Err(error) if error.code == "script.source.oversized"));
        assert_eq!(session.stats().skipped, 1);
    }
}
