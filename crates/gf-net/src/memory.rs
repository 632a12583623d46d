//! Fetch primitive backed by canned responses.

use crate::Fetch;
use crate::FetchRequest;
use crate::FetchResponse;
use gf_core::EmbedError;
use gf_core::EmbedResult;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

#[derive(Debug, Clone)]
enum Route {
    Respond(FetchResponse),
    Fail(EmbedError),
}

/// Shared view of every request a [`MemoryFetch`] has served.
#[derive(Debug, Clone, Default)]
pub struct FetchLog {
    entries: Arc<Mutex<Vec<FetchRequest>>>,
}

impl FetchLog {
    fn lock(&self) -> MutexGuard<'_, Vec<FetchRequest>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.lock().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.lock().iter().map(|request| request.url.clone()).collect()
    }

    fn push(&self, request: &FetchRequest) {
        self.lock().push(request.clone());
    }
}

/// Serves responses by exact URL; unknown URLs get a 404.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetch {
    routes: BTreeMap<String, Route>,
    log: FetchLog,
}

impl MemoryFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: &str, response: FetchResponse) -> Self {
        self.routes.insert(url.to_owned(), Route::Respond(response));
        self
    }

    /// Shorthand for a `text/html` response.
    pub fn with_page(self, url: &str, status: u16, html: &str) -> Self {
        let response =
            FetchResponse::new(url, status, html).with_header("Content-Type", "text/html; charset=utf-8");
        self.with_response(url, response)
    }

    pub fn with_failure(mut self, url: &str, error: EmbedError) -> Self {
        self.routes.insert(url.to_owned(), Route::Fail(error));
        self
    }

    pub fn log(&self) -> FetchLog {
        self.log.clone()
    }
}

impl Fetch for MemoryFetch {
    fn fetch(&mut self, request: &FetchRequest) -> EmbedResult<FetchResponse> {
        self.log.push(request);
        match self.routes.get(&request.url) {
            Some(Route::Respond(response)) => Ok(response.clone()),
            Some(Route::Fail(error)) => Err(error.clone()),
            None => Ok(FetchResponse::new(request.url.clone(), 404, "not found")),
        }
    }
}
