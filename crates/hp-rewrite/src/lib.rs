//! Document rewriting for embedded previews.
//!
//! Normalizes the `<base>` element and hyperlinks of a fetched document so it
//! can live inside a viewer frame, quarantines every `<script>` for the
//! external renderer, and derives the frame's target viewport width.

pub mod context;
pub mod placeholder;
mod rewriter;

pub use context::DEFAULT_HOST;
pub use context::RewriteContext;
pub use placeholder::PlaceholderValues;
pub use placeholder::substitute_placeholders;
pub use rewriter::DEFAULT_VIEWPORT_WIDTH;
pub use rewriter::DocumentRewriter;
pub use rewriter::QuarantinedScript;
pub use rewriter::RewrittenDocument;
pub use rewriter::ScriptDescriptor;
