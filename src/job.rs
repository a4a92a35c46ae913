//! One compile job: prefetch, render, resolve what the render could not find, render again.
//!
//! ## Overview
//!
//! A [`CompileJob`] turns an import graph that is only partially known up front into a finite
//! sequence of full, synchronous render attempts. The render itself cannot wait for the host's
//! asynchronous resolver, so every import the compiler cannot locate stops the attempt with a
//! [`RenderOutcome::NeedsResolution`]. The job resolves that one reference (plus whatever the
//! scanner discovers along the way) and renders again from scratch.
//!
//! ## States
//!
//! ```text
//! Prefetching -> Rendering -> Done
//!                   |  ^
//!                   v  |
//!           AwaitingResolution -> Failed
//! ```
//!
//! 1. **Prefetching**: the entry document is scanned and the [`ImportCache`] is drained, so
//!    imports the scanner can see are resolved before the first render.
//! 2. **Rendering**: the renderer runs against a [`CachedLookup`] over the job's cache.
//! 3. **AwaitingResolution**: the missing reference is resolved non-speculatively. Its failure
//!    ends the job with [`BridgeError::UnresolvedImport`].
//!
//! ## Progress
//!
//! Every retry resolves at least one reference that was unresolved before it, so the number of
//! attempts is bounded by the number of distinct references plus one. A reference reported
//! missing twice, or reported missing although the cache already holds it, is a
//! [`BridgeError::Consistency`] error instead of another retry.

use std::{collections::HashSet, path::PathBuf};

use crate::{
    config::LoaderOptions,
    error::BridgeError,
    host::{LoaderHost, SourceTree},
    reference::ReferenceKey,
    render::{CachedLookup, DocumentRenderer, PendingImport, RenderOutcome, RenderOutput},
    resolve::{ImportCache, PumpStats},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Prefetching,
    Rendering,
    AwaitingResolution,
    Done,
    Failed,
}

/// The result of a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    pub css: String,
    pub source_map: Option<String>,
    /// Every file that influenced the output, sorted, each once.
    pub dependencies: Vec<PathBuf>,
    /// Number of render attempts it took.
    pub attempts: usize,
}

pub struct CompileJob<'h, H: LoaderHost> {
    filename: PathBuf,
    source: String,
    imports: ImportCache<'h, H>,
    attempted: HashSet<ReferenceKey>,
    state: JobState,
    attempts: usize,
}

impl<'h, H: LoaderHost> CompileJob<'h, H> {
    pub fn new(
        host: &'h H,
        filename: impl Into<PathBuf>,
        source: impl Into<String>,
        options: LoaderOptions,
    ) -> Self {
        CompileJob {
            filename: filename.into(),
            source: source.into(),
            imports: ImportCache::new(host, options),
            attempted: HashSet::new(),
            state: JobState::Created,
            attempts: 0,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn stats(&self) -> PumpStats {
        self.imports.stats()
    }

    pub fn imports(&self) -> &ImportCache<'h, H> {
        &self.imports
    }

    fn transition(&mut self, next: JobState) {
        tracing::debug!(
            "[CompileJob] {:?}: {:?} -> {:?}",
            self.filename,
            self.state,
            next
        );
        self.state = next;
    }

    /// Run the job to completion. On success every dependency has been reported to the host.
    #[tracing::instrument(skip_all, fields(filename = %self.filename.display()))]
    pub async fn run<R, T>(&mut self, renderer: &mut R, tree: T) -> Result<CompileOutput, BridgeError>
    where
        R: DocumentRenderer + ?Sized,
        T: SourceTree,
    {
        let result = self.converge(renderer, tree).await;
        match &result {
            Ok(output) => tracing::info!(
                "[CompileJob] Rendered {:?} in {} attempt(s), {} dependencies",
                self.filename,
                output.attempts,
                output.dependencies.len()
            ),
            Err(e) => {
                self.transition(JobState::Failed);
                tracing::warn!("[CompileJob] {:?} failed: {}", self.filename, e);
            }
        }
        result
    }

    async fn converge<R, T>(&mut self, renderer: &mut R, tree: T) -> Result<CompileOutput, BridgeError>
    where
        R: DocumentRenderer + ?Sized,
        T: SourceTree,
    {
        self.transition(JobState::Prefetching);
        self.imports
            .enqueue_visit(self.filename.clone(), Some(self.source.clone()));
        self.imports.add_dependencies([self.filename.clone()]);
        self.imports.drain().await?;

        loop {
            self.transition(JobState::Rendering);
            self.attempts += 1;
            let (outcome, found) = {
                let mut lookup =
                    CachedLookup::new(&tree, self.imports.cache(), self.imports.options());
                let outcome = renderer.render(
                    &self.source,
                    &self.filename,
                    self.imports.options(),
                    &mut lookup,
                );
                (outcome, lookup.into_found())
            };
            self.imports.add_dependencies(found);

            match outcome? {
                RenderOutcome::Rendered(output) => {
                    self.transition(JobState::Done);
                    return Ok(self.finish(output));
                }
                RenderOutcome::NeedsResolution(pending) => {
                    self.transition(JobState::AwaitingResolution);
                    self.resolve_pending(pending).await?;
                }
            }
        }
    }

    async fn resolve_pending(&mut self, pending: PendingImport) -> Result<(), BridgeError> {
        let PendingImport {
            key,
            name,
            importer,
        } = pending;
        tracing::debug!(
            "[CompileJob] Attempt {} needs {} (\"{}\" in {:?})",
            self.attempts,
            key,
            name,
            importer
        );
        if self.imports.cache().lookup_key(&key).is_some() || !self.attempted.insert(key.clone())
        {
            tracing::error!(
                "[CompileJob] {} was reported unresolved after it was already resolved",
                key
            );
            return Err(BridgeError::Consistency {
                context: key.context,
                request: key.request,
            });
        }

        self.imports
            .enqueue_resolve(key.context.clone(), key.request.clone(), false);
        match self.imports.drain().await {
            Ok(()) => Ok(()),
            Err(BridgeError::Resolve {
                context,
                request,
                message,
            }) if key.matches(&context, &request) => Err(BridgeError::UnresolvedImport {
                importer,
                name,
                context,
                request,
                message,
            }),
            Err(e) => Err(e),
        }
    }

    fn finish(&self, output: RenderOutput) -> CompileOutput {
        let dependencies = self.imports.dependencies();
        let host = self.imports.host();
        for dependency in &dependencies {
            host.add_dependency(dependency);
        }
        CompileOutput {
            css: output.css,
            source_map: output.source_map,
            dependencies,
            attempts: self.attempts,
        }
    }
}

/// Compile one document with a fresh job.
pub async fn compile<H, T, R>(
    host: &H,
    tree: T,
    renderer: &mut R,
    filename: impl Into<PathBuf>,
    source: impl Into<String>,
    options: LoaderOptions,
) -> Result<CompileOutput, BridgeError>
where
    H: LoaderHost,
    T: SourceTree,
    R: DocumentRenderer + ?Sized,
{
    CompileJob::new(host, filename, source, options)
        .run(renderer, tree)
        .await
}
