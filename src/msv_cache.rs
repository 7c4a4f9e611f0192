// Locator-keyed cache of loaded samples with background fetches
use crate::msv_models::{LoadedSample, MsvError, Result, SampleRef};
use poll_promise::Promise;
use std::collections::{BTreeMap, HashMap};

/// Outcome of asking the cache for a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Already loaded; nothing was fetched.
    Hit,
    /// A fetch for this locator is already running.
    InFlight,
    /// A new fetch was started.
    Started,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Loaded(String),
    Failed { locator: String, error: MsvError },
}

impl Completion {
    pub fn locator(&self) -> &str {
        match self {
            Completion::Loaded(locator) | Completion::Failed { locator, .. } => locator,
        }
    }
}

struct PendingFetch<T: Send + 'static> {
    label: String,
    promise: Promise<Result<T>>,
}

pub struct LazyCache<T: Send + 'static> {
    entries: BTreeMap<String, LoadedSample<T>>,
    pending: HashMap<String, PendingFetch<T>>,
}

impl<T: Send + 'static> Default for LazyCache<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            pending: HashMap::new(),
        }
    }
}

impl<T: Send + 'static> LazyCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, locator: &str) -> Option<&LoadedSample<T>> {
        self.entries.get(locator)
    }

    #[cfg(test)]
    pub fn contains(&self, locator: &str) -> bool {
        self.entries.contains_key(locator)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loaded entries in locator order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &LoadedSample<T>)> {
        self.entries.iter()
    }

    /// Asynchronous lookup. `spawn` is called only when the locator is neither
    /// loaded nor already being fetched.
    pub fn request<F>(&mut self, sample: &SampleRef, spawn: F) -> Request
    where
        F: FnOnce() -> Promise<Result<T>>,
    {
        if self.entries.contains_key(&sample.locator) {
            return Request::Hit;
        }
        if self.pending.contains_key(&sample.locator) {
            return Request::InFlight;
        }

        self.pending.insert(
            sample.locator.clone(),
            PendingFetch {
                label: sample.label.clone(),
                promise: spawn(),
            },
        );
        Request::Started
    }

    /// Moves finished fetches into the cache.
    pub fn poll(&mut self) -> Vec<Completion> {
        let mut completions = Vec::new();
        let locators: Vec<String> = self.pending.keys().cloned().collect();

        for locator in locators {
            let Some(PendingFetch { label, promise }) = self.pending.remove(&locator) else {
                continue;
            };

            match promise.try_take() {
                Ok(Ok(payload)) => {
                    self.entries
                        .insert(locator.clone(), LoadedSample::new(label, payload));
                    completions.push(Completion::Loaded(locator));
                }
                Ok(Err(error)) => {
                    completions.push(Completion::Failed { locator, error });
                }
                Err(promise) => {
                    self.pending
                        .insert(locator, PendingFetch { label, promise });
                }
            }
        }

        completions
    }

    /// Drops every entry and every running fetch; late results are discarded.
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            log::debug!("Discarding {} in-flight fetch(es)", self.pending.len());
        }
        self.entries.clear();
        self.pending.clear();
    }
}
