//! Readiness detector port (interface).

/// Classification of one line of forwarding-tool output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// The tunnel is established.
    Ready,
    /// The tunnel is broken and the process should be torn down.
    Fatal,
    /// Anything else.
    Noise,
}

/// Port for interpreting the diagnostic output of a forwarding tool.
///
/// Output formats vary between tool versions, so implementations are
/// pluggable and tested against captured output.
pub trait ReadinessDetector: Send + Sync {
    fn classify(&self, line: &str) -> LineClass;
}
