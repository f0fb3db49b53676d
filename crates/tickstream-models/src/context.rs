use tracing::Span;

/// Logging context handed to each component explicitly.
///
/// Wraps a `tracing::Span` tagged with the component prefix (`DRIVER`,
/// `PRODUCER`, `CONSUMER`). Everything logged while the span is entered
/// carries the prefix and any fields attached to it.
#[derive(Debug, Clone)]
pub struct LogContext {
    prefix: &'static str,
    span: Span,
}

impl LogContext {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            span: tracing::info_span!("agent", prefix),
        }
    }

    /// Context for the process driver (configuration, dispatch).
    pub fn driver() -> Self {
        Self::new("DRIVER")
    }

    /// Derive a child context for a component, nested under this one.
    pub fn child(&self, prefix: &'static str) -> Self {
        Self {
            prefix,
            span: tracing::info_span!(parent: &self.span, "agent", prefix),
        }
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
