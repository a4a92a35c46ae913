//! Speculative prefetch and host resolution.
//!
//! [`ImportCache`] owns every piece of per-job resolution state: the [`ResolutionCache`], the
//! visit queue (documents waiting to be scanned), the resolve queue (references waiting for the
//! host resolver), the visited set and the dependency set.
//!
//! ## Draining
//!
//! [`ImportCache::drain`] runs the two queues to a fixed point in layers:
//!
//! 1. every pending visit is scanned, concurrently (bounded by `max-parallel-scans`), and each
//!    discovered import is queued for speculative resolution
//! 2. the resolve queue is serviced first-in-first-out, one host call at a time; every resolved
//!    dialect document is queued for a visit, which extends the frontier breadth-first
//!
//! Speculative failures are dropped: the compiler's own lookup may still find the file through
//! its include paths. Failures of references the compiler actually asked for are returned.

use futures::{stream, StreamExt};
use std::{
    collections::{BTreeSet, HashSet, VecDeque},
    path::{Path, PathBuf},
};

use crate::{
    cache::ResolutionCache,
    config::LoaderOptions,
    error::BridgeError,
    host::LoaderHost,
    reference::ReferenceKey,
    scan::{scan_file, ImportRef},
};

pub mod candidates;

pub use candidates::candidate_requests;

/// A reference waiting for the host resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResolve {
    pub key: ReferenceKey,
    /// Failure is tolerated and dropped.
    pub speculative: bool,
}

/// Counters describing the work an [`ImportCache`] has done.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub scans: usize,
    pub host_resolve_calls: usize,
    pub resolved: usize,
    pub dropped: usize,
}

pub struct ImportCache<'h, H: LoaderHost> {
    host: &'h H,
    options: LoaderOptions,
    cache: ResolutionCache,
    visit_queue: VecDeque<(PathBuf, Option<String>)>,
    visited: HashSet<PathBuf>,
    resolve_queue: VecDeque<PendingResolve>,
    dependencies: BTreeSet<PathBuf>,
    stats: PumpStats,
}

impl<'h, H: LoaderHost> ImportCache<'h, H> {
    pub fn new(host: &'h H, options: LoaderOptions) -> Self {
        ImportCache {
            host,
            options,
            cache: ResolutionCache::new(),
            visit_queue: VecDeque::new(),
            visited: HashSet::new(),
            resolve_queue: VecDeque::new(),
            dependencies: BTreeSet::new(),
            stats: PumpStats::default(),
        }
    }

    pub fn host(&self) -> &'h H {
        self.host
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    pub fn has_pending(&self) -> bool {
        !self.visit_queue.is_empty() || !self.resolve_queue.is_empty()
    }

    pub fn is_visited(&self, filename: &Path) -> bool {
        self.visited.contains(filename)
    }

    /// Queue a document for scanning. `source` saves a read when the text is already known.
    ///
    /// Returns `false` (and does nothing) when prefetching is disabled, the file is not a dialect
    /// document, or it was already visited or queued.
    pub fn enqueue_visit(&mut self, filename: impl Into<PathBuf>, source: Option<String>) -> bool {
        if !self.options.prefetch {
            return false;
        }
        let filename = filename.into();
        if !self.options.dialect.is_dialect_file(&filename)
            || self.visited.contains(&filename)
            || self.visit_queue.iter().any(|(queued, _)| queued == &filename)
        {
            return false;
        }
        self.visit_queue.push_back((filename, source));
        true
    }

    /// Queue a reference for the host resolver unless it is cached or already queued.
    ///
    /// A queued speculative entry is promoted when the same key is enqueued non-speculatively.
    pub fn enqueue_resolve(
        &mut self,
        context: impl Into<PathBuf>,
        request: impl Into<String>,
        speculative: bool,
    ) -> bool {
        let key = ReferenceKey::new(context, request);
        if self.cache.lookup_key(&key).is_some() {
            return false;
        }
        if let Some(pending) = self.resolve_queue.iter_mut().find(|p| p.key == key) {
            if !speculative && pending.speculative {
                pending.speculative = false;
            }
            return false;
        }
        self.resolve_queue.push_back(PendingResolve { key, speculative });
        true
    }

    /// Record files the compiler found on its own; they count as dependencies and are visited.
    pub fn add_dependencies<I, P>(&mut self, found: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for path in found {
            let path = path.into();
            self.enqueue_visit(path.clone(), None);
            self.dependencies.insert(path);
        }
    }

    /// Every file that was scanned, resolved, or found by the compiler, sorted.
    pub fn dependencies(&self) -> Vec<PathBuf> {
        self.dependencies.iter().cloned().collect()
    }

    /// Run both queues to a fixed point.
    pub async fn drain(&mut self) -> Result<(), BridgeError> {
        while self.has_pending() {
            self.flush_visits().await;
            self.flush_resolves().await?;
        }
        Ok(())
    }

    async fn flush_visits(&mut self) {
        let mut batch = Vec::with_capacity(self.visit_queue.len());
        while let Some((filename, source)) = self.visit_queue.pop_front() {
            if self.visited.insert(filename.clone()) {
                batch.push((filename, source));
            }
        }
        if batch.is_empty() {
            return;
        }
        tracing::debug!("[ImportCache] Scanning {} document(s)", batch.len());

        let host = self.host;
        let tables = self.options.scan_tables();
        let dialect = &self.options.dialect;
        let scanned: Vec<(PathBuf, Result<Vec<ImportRef>, BridgeError>)> = stream::iter(batch)
            .map(|(filename, source)| {
                let tables = &tables;
                async move {
                    let imports =
                        scan_file(host, filename.clone(), source, tables, dialect).await;
                    (filename, imports)
                }
            })
            .buffered(self.options.max_parallel_scans.max(1))
            .collect()
            .await;

        for (filename, scan) in scanned {
            let imports = match scan {
                Ok(imports) => imports,
                Err(e) => {
                    tracing::debug!("[ImportCache] Cannot read {:?}: {}", filename, e);
                    continue;
                }
            };
            self.stats.scans += 1;
            self.dependencies.insert(filename);
            for import in imports {
                let request = self.options.request_for(&import.name);
                self.enqueue_resolve(import.context, request, true);
            }
        }
    }

    async fn flush_resolves(&mut self) -> Result<(), BridgeError> {
        while let Some(PendingResolve { key, speculative }) = self.resolve_queue.pop_front() {
            self.resolve_import(&key.context, &key.request, speculative)
                .await?;
        }
        Ok(())
    }

    /// Resolve one reference through the host, applying the compiler's filename inference.
    ///
    /// On success both the original request and the candidate that matched are cached, and the
    /// resolved document is queued for a visit. On failure a speculative reference yields
    /// `Ok(None)`; anything else yields the host's error for the original `(context, request)`.
    pub async fn resolve_import(
        &mut self,
        context: &Path,
        request: &str,
        speculative: bool,
    ) -> Result<Option<PathBuf>, BridgeError> {
        if let Some(cached) = self.cache.lookup(context, request) {
            return Ok(Some(cached.to_path_buf()));
        }

        let mut messages = Vec::new();
        for candidate in candidate_requests(request, &self.options.dialect) {
            self.stats.host_resolve_calls += 1;
            match self.host.resolve(context, &candidate).await {
                Ok(resolved) => {
                    tracing::debug!(
                        "[ImportCache] ({}, {}) -> {:?}",
                        context.display(),
                        request,
                        resolved
                    );
                    self.cache.store(context, request, &resolved);
                    self.cache.store(context, &candidate, &resolved);
                    self.stats.resolved += 1;
                    self.dependencies.insert(resolved.clone());
                    self.enqueue_visit(resolved.clone(), None);
                    return Ok(Some(resolved));
                }
                Err(BridgeError::Resolve { message, .. }) => messages.push(message),
                Err(e) => messages.push(e.to_string()),
            }
        }

        if speculative {
            tracing::debug!(
                "[ImportCache] Dropping speculative ({}, {}): {}",
                context.display(),
                request,
                messages.join("; ")
            );
            self.stats.dropped += 1;
            return Ok(None);
        }
        Err(BridgeError::Resolve {
            context: context.to_path_buf(),
            request: request.to_string(),
            message: messages.join("; "),
        })
    }
}
