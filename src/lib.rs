//! # Preview Engine
//!
//! Turns generated hybrid JSX/TypeScript component text into a rendered,
//! self-contained HTML preview document.
//!
//! ## Pipeline Invariants
//!
//! 1. **Normalization is advisory**: dialect passes strip module syntax,
//!    type syntax, and tool artifacts, but only ever emit diagnostics.
//!    Text inside markup spans is never touched.
//!
//! 2. **One repair pass**: the markup compiler retries exactly once after
//!    aggressive repair, and on a second failure reports the ORIGINAL
//!    parse error, not the post-repair one.
//!
//! 3. **Validation gates priority**: a candidate name wins only if its
//!    guarded zero-argument invocation yields a renderable value, whatever
//!    its declaration-form priority says.
//!
//! 4. **Isolation per attempt**: every execution attempt gets a fresh
//!    surface (thread, arena, interpreter namespace). Nothing evaluated in
//!    one attempt is observable from another.
//!
//! 5. **Downward-only tiers**: Full → Simplified → Static, never upward
//!    within a request, and the static floor cannot fail. A preview
//!    request always returns a document.

mod classify;
mod error;
mod fallback;
mod host;
mod interp;
mod lower;
mod normalize;
mod render;
mod resolve;

pub use error::{
    AttemptOutcome, AuxiliaryFile, EngineError, NormalizationDiagnostic, RemovedConstruct,
    RenderAttempt, RenderTier, SourceUnit, StylingMode, TimeoutKind,
};
pub use fallback::{EngineConfig, PreviewEngine, PreviewResponse};
pub use host::HostConfig;

#[cfg(test)]
mod engine_tests;
