//! Non-fatal anomalies collected during a build.

use smol_str::SmolStr;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnomalyKind {
    /// A `$ref` names a definition that does not exist
    UndefinedReference,
    /// Same, but the name is in the documented known-missing set
    KnownMissingType,
    /// Cyclic group the split strategy cannot handle
    UnsupportedCycle,
    /// References a type excluded for an unsupported cycle
    DependsOnExcluded,
    /// No class fits the operation
    UnboundOperation,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UndefinedReference => "undefined-reference",
            Self::KnownMissingType => "known-missing-type",
            Self::UnsupportedCycle => "unsupported-cycle",
            Self::DependsOnExcluded => "depends-on-excluded",
            Self::UnboundOperation => "unbound-operation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub version: Option<SmolStr>,
    /// Type name, definition key or operation id
    pub subject: SmolStr,
    pub reason: String,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "[{}] {}/{}: {}", self.kind.as_str(), v, self.subject, self.reason),
            None => write!(f, "[{}] {}: {}", self.kind.as_str(), self.subject, self.reason),
        }
    }
}

/// Anomalies of one release build, in the order they were found
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    release: SmolStr,
    anomalies: Vec<Anomaly>,
}

impl Diagnostics {
    pub fn new(release: impl Into<SmolStr>) -> Self {
        Self {
            release: release.into(),
            anomalies: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        kind: AnomalyKind,
        version: Option<&str>,
        subject: impl Into<SmolStr>,
        reason: impl Into<String>,
    ) {
        let anomaly = Anomaly {
            kind,
            version: version.map(SmolStr::from),
            subject: subject.into(),
            reason: reason.into(),
        };
        match kind {
            AnomalyKind::KnownMissingType
            | AnomalyKind::DependsOnExcluded
            | AnomalyKind::UnboundOperation => {
                tracing::debug!(release = %self.release, "{}", anomaly)
            }
            _ => tracing::warn!(release = %self.release, "{}", anomaly),
        }
        self.anomalies.push(anomaly);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter()
    }

    pub fn of_kind(&self, kind: AnomalyKind) -> impl Iterator<Item = &Anomaly> {
        self.anomalies.iter().filter(move |a| a.kind == kind)
    }

    pub fn count(&self, kind: AnomalyKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }
}
