//! Pattern-based readiness detection for forwarding tool output.

use regex::Regex;

use crate::error::{Error, Result};
use crate::ports::{LineClass, ReadinessDetector};

/// kubectl prints this once the local listener is bound.
pub const KUBECTL_READY_PATTERNS: &[&str] = &[r"Forwarding from \S+:\d+ -> \d+"];

/// kubectl keeps running after these, but the tunnel no longer carries traffic.
pub const KUBECTL_FATAL_PATTERNS: &[&str] = &[
    r"(?i)error forwarding port",
    r"(?i)error upgrading connection",
    r"(?i)unable to upgrade connection",
    r"(?i)lost connection to pod",
];

/// Classifies lines with regular expressions. Fatal patterns win over ready ones.
#[derive(Debug, Clone)]
pub struct PatternReadinessDetector {
    ready: Vec<Regex>,
    fatal: Vec<Regex>,
}

impl PatternReadinessDetector {
    /// Builds a detector from pattern lists.
    pub fn new<S: AsRef<str>>(ready: &[S], fatal: &[S]) -> Result<Self> {
        if ready.is_empty() {
            return Err(Error::Config(
                "At least one readiness pattern is required".to_string(),
            ));
        }
        Ok(Self {
            ready: compile(ready)?,
            fatal: compile(fatal)?,
        })
    }

    /// Detector for `kubectl port-forward` output.
    pub fn kubectl() -> Self {
        Self::new(KUBECTL_READY_PATTERNS, KUBECTL_FATAL_PATTERNS)
            .expect("built-in kubectl patterns are valid")
    }
}

impl Default for PatternReadinessDetector {
    fn default() -> Self {
        Self::kubectl()
    }
}

impl ReadinessDetector for PatternReadinessDetector {
    fn classify(&self, line: &str) -> LineClass {
        if self.fatal.iter().any(|re| re.is_match(line)) {
            LineClass::Fatal
        } else if self.ready.iter().any(|re| re.is_match(line)) {
            LineClass::Ready
        } else {
            LineClass::Noise
        }
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p.as_ref()).map_err(|e| {
                Error::Config(format!("Invalid output pattern '{}': {}", p.as_ref(), e))
            })
        })
        .collect()
}
