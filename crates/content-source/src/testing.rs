//! In-process content source for tests.
//!
//! [`ScriptedSource`] replays one [`ScriptedRun`] per call to `start` and
//! records every request it receives. Once the script is used up, each run
//! is empty and hands back a cursor derived from the request.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mirror_types::RemoteItem;

use crate::{ContentSource, PageSet, SourceError, SyncPage, SyncRequest};

/// Canned pages for a single run.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    pages: Vec<Vec<RemoteItem>>,
    cursor: String,
    fail_at_page: Option<usize>,
    fail_on_start: bool,
}

impl ScriptedRun {
    /// A run that ends with `cursor` as its resumption cursor.
    pub fn new(cursor: impl Into<String>) -> Self {
        Self {
            cursor: cursor.into(),
            ..Default::default()
        }
    }

    /// Append a page.
    pub fn page(mut self, items: Vec<RemoteItem>) -> Self {
        self.pages.push(items);
        self
    }

    /// Fail when page `index` (0-based) is requested.
    pub fn fail_at_page(mut self, index: usize) -> Self {
        self.fail_at_page = Some(index);
        self
    }

    /// Fail before any page is returned.
    pub fn fail_on_start(mut self) -> Self {
        self.fail_on_start = true;
        self
    }
}

#[derive(Default)]
struct Inner {
    runs: VecDeque<ScriptedRun>,
    requests: Vec<SyncRequest>,
}

/// A [`ContentSource`] that replays scripted runs.
#[derive(Default)]
pub struct ScriptedSource {
    inner: Mutex<Inner>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`ScriptedSource::push`].
    pub fn with_run(self, run: ScriptedRun) -> Self {
        self.push(run);
        self
    }

    /// Queue a run.
    pub fn push(&self, run: ScriptedRun) {
        self.lock().runs.push_back(run);
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.lock().requests.clone()
    }

    /// Number of runs started so far.
    pub fn start_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn start(&self, request: SyncRequest) -> Result<Box<dyn PageSet>, SourceError> {
        let run = {
            let mut inner = self.lock();
            inner.requests.push(request.clone());
            inner.runs.pop_front()
        };

        let run = run.unwrap_or_else(|| match &request {
            SyncRequest::Resume { cursor } => ScriptedRun::new(cursor.clone()),
            SyncRequest::Initial { .. } => ScriptedRun::new("initial"),
        });

        if run.fail_on_start {
            return Err(SourceError::Unavailable("scripted start failure".to_string()));
        }

        Ok(Box::new(ScriptedPages {
            pages: run.pages.into(),
            cursor: run.cursor,
            fail_at_page: run.fail_at_page,
            served: 0,
            exhausted: false,
        }))
    }
}

struct ScriptedPages {
    pages: VecDeque<Vec<RemoteItem>>,
    cursor: String,
    fail_at_page: Option<usize>,
    served: usize,
    exhausted: bool,
}

#[async_trait]
impl PageSet for ScriptedPages {
    async fn next_page(&mut self) -> Result<Option<SyncPage>, SourceError> {
        if self.fail_at_page == Some(self.served) {
            return Err(SourceError::Unavailable(format!(
                "scripted failure at page {}",
                self.served
            )));
        }
        match self.pages.pop_front() {
            Some(items) => {
                self.served += 1;
                Ok(Some(SyncPage::new(items)))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn resumption_cursor(&self) -> Option<&str> {
        self.exhausted.then_some(self.cursor.as_str())
    }
}
