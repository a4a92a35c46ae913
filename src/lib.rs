//! # styl-bridge
//!
//! Bridges a synchronous stylesheet compiler, whose `@import` lookup can only search the
//! filesystem, with the asynchronous module resolver of a host build system.
//!
//! ## Overview
//!
//! The compiler renders a document in one blocking pass and cannot wait for the host to resolve
//! package-style references such as `@import "~theme/buttons"`. styl-bridge closes that gap
//! with a per-job resolution cache that the compiler's import lookups consult, and a retry loop:
//!
//! - **Prefetch**: the entry document is scanned statically, and every import the scanner can
//!   determine is resolved through the host ahead of time, breadth-first over the import graph
//! - **Render**: the compiler runs with lookups backed by the cache; a host reference it cannot
//!   locate ends the attempt with [`render::RenderOutcome::NeedsResolution`]
//! - **Converge**: the missing reference is resolved and the document rendered again, until it
//!   renders or a reference fails to resolve
//!
//! Every file that took part is reported to the host as a build dependency.
//!
//! ## Architecture
//!
//! - **[`reference`]**: `(context, request)` keys and request canonicalization
//! - **[`cache`]**: the per-job [`cache::ResolutionCache`]
//! - **[`scan`]**: the best-effort static import scanner (lexer, parser, evaluator)
//! - **[`resolve`]**: [`resolve::ImportCache`], the visit/resolve queue pump and host adapter
//! - **[`render`]**: the compiler boundary ([`render::DocumentRenderer`],
//!   [`render::ImportLookup`]) and the bundled [`render::InlineRenderer`]
//! - **[`job`]**: [`job::CompileJob`], the convergence loop
//! - **[`host`]**: the build-system interfaces plus in-memory and filesystem hosts
//! - **[`config`]**: [`config::LoaderOptions`], loaded from TOML profiles
//!
//! ## Quick Start
//!
//! ```rust
//! use styl_bridge::{config::LoaderOptions, host::MemoryHost, job::compile, render::InlineRenderer};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), styl_bridge::BridgeError> {
//!     let host = MemoryHost::new()
//!         .with_module_dir("/app/node_modules")
//!         .with_file("/app/node_modules/theme/index.styl", "brand = teal\n");
//!     let mut renderer = InlineRenderer::new();
//!
//!     let output = compile(
//!         &host,
//!         &host,
//!         &mut renderer,
//!         "/app/main.styl",
//!         "@import '~theme'\n.logo\n  color brand\n",
//!         LoaderOptions::default(),
//!     )
//!     .await?;
//!
//!     assert_eq!(output.css, "brand = teal\n.logo\n  color brand\n");
//!     assert_eq!(output.attempts, 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **default**: the library
//! - **bin**: the `styl-bridge` command line tool

pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod job;
pub mod reference;
pub mod render;
pub mod resolve;
pub mod scan;
#[cfg(test)]
mod tests;

pub use error::*;
