//! Environment evaluated once into every session before any page script.

/// Browser globals the embedded runtime expects, with host-facing hooks under `__graft_`.
///
/// `fetch`, `history`, and `location.assign`/`replace` never act on their own: they
/// push records into `__graft_outbox`, which the host drains after every evaluation.
pub(crate) const BOOTSTRAP_ENV: &str = r#"
globalThis.window = globalThis;
globalThis.self = globalThis;
globalThis.global = globalThis;
globalThis.console = {
  log: function () {},
  info: function () {},
  debug: function () {},
  warn: function () {},
  error: function () {}
};
globalThis.navigator = {
  userAgent: "Mozilla/5.0 (compatible; graft)",
  language: "en-US",
  languages: ["en-US", "en"],
  sendBeacon: function () { return true; }
};

globalThis.__graft_outbox = [];
globalThis.__graft_pending = {};
globalThis.__graft_next_fetch = 1;
globalThis.__graft_now = 0;
globalThis.__graft_timers = [];
globalThis.__graft_next_timer = 1;
globalThis.__graft_data = {};

function __graft_event_target(target) {
  var listeners = {};
  target.addEventListener = function (type, handler) {
    var key = String(type || "");
    if (!key || typeof handler !== "function") {
      return;
    }
    (listeners[key] = listeners[key] || []).push(handler);
  };
  target.removeEventListener = function (type, handler) {
    var list = listeners[String(type || "")];
    if (!list) {
      return;
    }
    var index = list.indexOf(handler);
    if (index >= 0) {
      list.splice(index, 1);
    }
  };
  target.dispatchEvent = function (event) {
    var list = listeners[String((event && event.type) || "")] || [];
    for (var i = 0; i < list.length; i += 1) {
      list[i].call(target, event);
    }
    return true;
  };
  return target;
}
__graft_event_target(globalThis);

globalThis.setTimeout = function (callback, delay) {
  var id = globalThis.__graft_next_timer++;
  var wait = Number(delay) || 0;
  globalThis.__graft_timers.push({
    id: id,
    due: globalThis.__graft_now + (wait > 0 ? wait : 0),
    cb: callback,
    args: Array.prototype.slice.call(arguments, 2)
  });
  return id;
};
globalThis.clearTimeout = function (id) {
  globalThis.__graft_timers = globalThis.__graft_timers.filter(function (task) {
    return task.id !== id;
  });
};
// Intervals fire once.
globalThis.setInterval = globalThis.setTimeout;
globalThis.clearInterval = globalThis.clearTimeout;
globalThis.requestAnimationFrame = function (callback) {
  return globalThis.setTimeout(function () {
    callback(globalThis.__graft_now);
  }, 16);
};
globalThis.cancelAnimationFrame = globalThis.clearTimeout;
globalThis.queueMicrotask = function (callback) {
  Promise.resolve().then(callback);
};
globalThis.performance = {
  now: function () { return globalThis.__graft_now; },
  mark: function () {},
  measure: function () {}
};
globalThis.matchMedia = function (query) {
  return __graft_event_target({ media: String(query || ""), matches: false });
};

globalThis.__graft_run_timers = function (now, limit) {
  globalThis.__graft_now = now;
  var runs = 0;
  while (runs < limit) {
    var timers = globalThis.__graft_timers;
    var next = -1;
    for (var i = 0; i < timers.length; i += 1) {
      if (timers[i].due <= now && (next < 0 || timers[i].due < timers[next].due)) {
        next = i;
      }
    }
    if (next < 0) {
      break;
    }
    var task = timers.splice(next, 1)[0];
    runs += 1;
    if (typeof task.cb === "function") {
      task.cb.apply(globalThis, task.args);
    } else if (task.cb != null) {
      (0, eval)(String(task.cb));
    }
  }
  return runs;
};
globalThis.__graft_next_due = function () {
  var due = -1;
  var timers = globalThis.__graft_timers;
  for (var i = 0; i < timers.length; i += 1) {
    if (due < 0 || timers[i].due < due) {
      due = timers[i].due;
    }
  }
  return due;
};

globalThis.fetch = function (input, init) {
  var options = init || {};
  var url = (typeof input === "object" && input !== null && "url" in input)
    ? String(input.url)
    : String(input);
  var id = globalThis.__graft_next_fetch++;
  globalThis.__graft_outbox.push({
    kind: "fetch",
    id: id,
    url: url,
    method: String(options.method || "GET").toUpperCase(),
    credentials: options.credentials == null ? null : String(options.credentials),
    body: options.body == null ? null : String(options.body)
  });
  return new Promise(function (resolve, reject) {
    globalThis.__graft_pending[id] = { resolve: resolve, reject: reject };
  });
};
globalThis.__graft_settle = function (id, status, url, body) {
  var entry = globalThis.__graft_pending[id];
  if (!entry) {
    return false;
  }
  delete globalThis.__graft_pending[id];
  entry.resolve({
    ok: status >= 200 && status < 300,
    status: status,
    url: url,
    text: function () { return Promise.resolve(body); },
    json: function () {
      return Promise.resolve().then(function () { return JSON.parse(body); });
    }
  });
  return true;
};
globalThis.__graft_fail = function (id, message) {
  var entry = globalThis.__graft_pending[id];
  if (!entry) {
    return false;
  }
  delete globalThis.__graft_pending[id];
  entry.reject(new TypeError(message));
  return true;
};

function __graft_navigate(source, method, url) {
  globalThis.__graft_outbox.push({
    kind: "navigate",
    source: source,
    method: method,
    url: String(url)
  });
}

globalThis.__graft_delegate = function (method, url) {
  var originals = globalThis.__graft_router_originals;
  var router = globalThis.next && globalThis.next.router;
  if (!originals || !router || typeof originals[method] !== "function") {
    return false;
  }
  var result = originals[method].call(router, url);
  if (result && typeof result.then === "function") {
    result.then(null, function () {});
  }
  return true;
};

globalThis.location = {
  href: "about:blank",
  origin: "null",
  protocol: "about:",
  host: "",
  pathname: "blank",
  search: "",
  hash: "",
  assign: function (next) { __graft_navigate("location", "push", next); },
  replace: function (next) { __graft_navigate("location", "replace", next); },
  reload: function () {},
  toString: function () { return this.href; }
};
globalThis.__graft_set_location = function (href) {
  var parts = /^([A-Za-z][A-Za-z0-9+.-]*:)\/\/([^\/?#]*)([^?#]*)(\?[^#]*)?(#.*)?$/.exec(href);
  var location = globalThis.location;
  location.href = href;
  if (parts) {
    location.protocol = parts[1];
    location.host = parts[2];
    location.hostname = parts[2].replace(/:\d+$/, "");
    location.origin = parts[1] + "//" + parts[2];
    location.pathname = parts[3] || "/";
    location.search = parts[4] || "";
    location.hash = parts[5] || "";
  }
};

globalThis.history = {
  length: 1,
  state: null,
  scrollRestoration: "auto",
  pushState: function (state, _title, url) {
    this.state = state === undefined ? null : state;
    if (url != null) {
      __graft_navigate("history", "push", url);
    }
  },
  replaceState: function (state, _title, url) {
    this.state = state === undefined ? null : state;
    if (url != null) {
      __graft_navigate("history", "replace", url);
    }
  },
  back: function () {},
  forward: function () {},
  go: function () {}
};

globalThis.document = __graft_event_target({
  readyState: "complete",
  title: "",
  cookie: "",
  head: __graft_event_target({ appendChild: function (child) { return child; } }),
  body: __graft_event_target({ appendChild: function (child) { return child; } }),
  getElementById: function (id) {
    var data = globalThis.__graft_data[String(id)];
    if (data === undefined) {
      return null;
    }
    return { id: String(id), textContent: JSON.stringify(data) };
  },
  querySelector: function () { return null; },
  querySelectorAll: function () { return []; },
  createElement: function (tag) {
    return __graft_event_target({
      tagName: String(tag || "").toUpperCase(),
      style: {},
      children: [],
      appendChild: function (child) { this.children.push(child); return child; },
      setAttribute: function (name, value) { this[String(name)] = String(value); },
      getAttribute: function (name) {
        var key = String(name);
        return Object.prototype.hasOwnProperty.call(this, key) ? this[key] : null;
      }
    });
  }
});
globalThis.document.location = globalThis.location;
"#;

/// Wraps `next.router.push`/`replace` once; evaluates to `absent`, `patched`, or `already`.
pub(crate) const PATCH_ROUTER: &str = r#"
(function () {
  var next = globalThis.next;
  var router = next && next.router;
  if (!router || typeof router.push !== "function" || typeof router.replace !== "function") {
    return "absent";
  }
  if (router.__graft_patched === true) {
    return "already";
  }

  function target(url, as) {
    if (typeof as === "string") {
      return as;
    }
    if (typeof url === "string") {
      return url;
    }
    if (url && typeof url === "object") {
      var path = String(url.pathname || "");
      var query = url.query;
      var search = "";
      if (typeof query === "string") {
        search = query;
      } else if (query && typeof query === "object") {
        search = Object.keys(query).map(function (key) {
          return encodeURIComponent(key) + "=" + encodeURIComponent(String(query[key]));
        }).join("&");
      }
      return search ? path + "?" + search : path;
    }
    return String(url);
  }

  globalThis.__graft_router_originals = { push: router.push, replace: router.replace };
  router.push = function (url, as) {
    __graft_navigate("router", "push", target(url, as));
    return Promise.resolve(true);
  };
  router.replace = function (url, as) {
    __graft_navigate("router", "replace", target(url, as));
    return Promise.resolve(true);
  };
  router.__graft_patched = true;
  return "patched";
})()
"#;

/// Drains the outbox as a JSON array.
pub(crate) const DRAIN_OUTBOX: &str = "JSON.stringify(globalThis.__graft_outbox.splice(0))";

pub(crate) const NEXT_TIMER_DUE: &str = "globalThis.__graft_next_due()";
