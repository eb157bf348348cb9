use serde::{Deserialize, Serialize};

/// The kind of hardware peripheral a module wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Uart,
    I2c,
    Spi,
    Can,
    Ethernet,
    Watchdog,
    Eeprom,
    Adc,
    Pwm,
    Sensor,
    Motor,
    Flash,
    Other,
}

impl ModuleKind {
    /// Domain hints fed to the retrieval engine for this module kind.
    pub fn domain_hints(self) -> &'static [&'static str] {
        match self {
            ModuleKind::Uart | ModuleKind::I2c | ModuleKind::Spi | ModuleKind::Can
            | ModuleKind::Ethernet => &["protocol", "comm"],
            ModuleKind::Watchdog => &["safety", "control-flow"],
            ModuleKind::Eeprom | ModuleKind::Flash => &["memory"],
            ModuleKind::Adc | ModuleKind::Pwm | ModuleKind::Sensor | ModuleKind::Motor => {
                &["control-flow"]
            }
            ModuleKind::Other => &["general"],
        }
    }
}

/// Severity of a quality-agent issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Penalty subtracted from `overall_score` per issue of this severity.
    pub fn score_penalty(self) -> u32 {
        match self {
            Severity::Critical => 25,
            Severity::High => 10,
            Severity::Medium => 4,
            Severity::Low => 1,
        }
    }
}

/// Document priority used by the retrieval engine's scoring formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Numeric weight used directly in the scoring formula.
    pub fn weight(self) -> f64 {
        match self {
            Priority::Critical => 1.0,
            Priority::High => 0.8,
            Priority::Medium => 0.6,
            Priority::Low => 0.4,
        }
    }
}

/// The lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// The caller's optimization preference, surfaced to the architecture and
/// code prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationGoal {
    Balanced,
    Performance,
    Size,
    Power,
}

impl Default for OptimizationGoal {
    fn default() -> Self {
        OptimizationGoal::Balanced
    }
}

/// Which LM backend a run should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Mock,
    Real,
}

impl Default for ModelProvider {
    fn default() -> Self {
        ModelProvider::Mock
    }
}

/// The canonical artifact categories. Governs both MCP checks and the
/// on-disk storage path; `Display`/`FromStr` round-trip through the
/// lowercase string form used in the capability matrix and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Requirements,
    Architecture,
    ModuleCode,
    Tests,
    Reports,
    BuildLog,
}

impl ArtifactType {
    /// The directory name this artifact type is stored under.
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactType::Requirements => "requirements",
            ArtifactType::Architecture => "architecture",
            ArtifactType::ModuleCode => "module_code",
            ArtifactType::Tests => "tests",
            ArtifactType::Reports => "reports",
            ArtifactType::BuildLog => "build_log",
        }
    }

    /// Parse the base type out of a possibly-qualified permission string,
    /// e.g. `"module_code:uart0"` -> `ArtifactType::ModuleCode`. Unknown or
    /// malformed strings (including the rejected legacy `quality_report`
    /// name) return `None`.
    pub fn parse_base(s: &str) -> Option<Self> {
        let base = s.split(':').next().unwrap_or(s);
        match base {
            "requirements" => Some(ArtifactType::Requirements),
            "architecture" => Some(ArtifactType::Architecture),
            "module_code" => Some(ArtifactType::ModuleCode),
            "tests" => Some(ArtifactType::Tests),
            "reports" => Some(ArtifactType::Reports),
            "build_log" => Some(ArtifactType::BuildLog),
            _ => None,
        }
    }
}

/// The physical shape of an artifact on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Text,
    Json,
    MultiFile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_base_strips_qualifier() {
        assert_eq!(
            ArtifactType::parse_base("module_code:uart0"),
            Some(ArtifactType::ModuleCode)
        );
    }

    #[test]
    fn parse_base_rejects_legacy_quality_report_name() {
        assert_eq!(ArtifactType::parse_base("quality_report"), None);
    }

    #[test]
    fn severity_ordering_matches_score_penalty_order() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}
