use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use warden_approvals::SodPolicy;
use warden_core::ExecutionMode;
use warden_limits::RateLimitConfig;
use warden_policy::RuleSpec;

/// Root configuration — maps to `warden.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Kernel execution mode: "live" or "dry".
    pub mode: ExecutionMode,
    pub limits: LimitsConfig,
    pub approvals: ApprovalsConfig,
    pub ledger: LedgerConfig,
    pub policy: PolicyConfig,
    pub logging: LoggingConfig,
}

// ── Limits ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Base token-bucket capacity per admission key.
    pub rate_base: u32,
    /// Extra burst allowance on top of the base capacity.
    pub rate_burst: u32,
    /// Tokens refilled per second.
    pub refill_per_sec: f64,
    /// Maximum in-flight actions per action kind.
    pub max_concurrent: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let rate = RateLimitConfig::default();
        Self {
            rate_base: rate.base,
            rate_burst: rate.burst,
            refill_per_sec: rate.refill_per_sec,
            max_concurrent: 8,
        }
    }
}

impl LimitsConfig {
    /// Project the rate-limit fields into the limiter's own config type.
    pub fn rate_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            base: self.rate_base,
            burst: self.rate_burst,
            refill_per_sec: self.refill_per_sec,
        }
    }
}

// ── Approvals ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalsConfig {
    /// Seconds a gate waits for a human before timing out.
    pub timeout_secs: u64,
    /// Separation-of-duties policy applied to every resolution attempt.
    pub sod: SodPolicy,
}

impl Default for ApprovalsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            sod: SodPolicy::default(),
        }
    }
}

// ── Ledger ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger backend: "memory" or "sqlite".
    pub backend: String,
    /// Path to the SQLite database, used when backend = "sqlite".
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            path: PathBuf::from("warden-audit.db"),
        }
    }
}

// ── Policy ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Declarative rules, evaluated in the order written here.
    pub rules: Vec<RuleSpec>,
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Default for root ───────────────────────────────────────────

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Dry,
            limits: LimitsConfig::default(),
            approvals: ApprovalsConfig::default(),
            ledger: LedgerConfig::default(),
            policy: PolicyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({h})")?;
        }
        Ok(())
    }
}

impl WardenConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Limits ───
        if self.limits.rate_base == 0 {
            warnings.push(ConfigWarning {
                field: "limits.rate_base".into(),
                message: "base capacity is 0 — every action would be rate-limited".into(),
                severity: WarningSeverity::Error,
                hint: Some("set to e.g. 30".into()),
            });
        }
        if self.limits.refill_per_sec <= 0.0 {
            warnings.push(ConfigWarning {
                field: "limits.refill_per_sec".into(),
                message: format!(
                    "refill rate {} means drained buckets never recover",
                    self.limits.refill_per_sec
                ),
                severity: WarningSeverity::Error,
                hint: Some("set to e.g. 5.0".into()),
            });
        }
        if self.limits.max_concurrent == 0 {
            warnings.push(ConfigWarning {
                field: "limits.max_concurrent".into(),
                message: "max_concurrent is 0 — no action can ever run".into(),
                severity: WarningSeverity::Error,
                hint: Some("set to e.g. 8".into()),
            });
        }

        // ── Approvals ───
        if self.approvals.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "approvals.timeout_secs".into(),
                message: "timeout is 0 — every approval gate times out immediately".into(),
                severity: WarningSeverity::Error,
                hint: Some("set to e.g. 300".into()),
            });
        }
        if self.approvals.sod.default_approver_roles.is_empty() {
            warnings.push(ConfigWarning {
                field: "approvals.sod.default_approver_roles".into(),
                message: "empty role set — nobody can approve unlisted action kinds".into(),
                severity: WarningSeverity::Warning,
                hint: Some("the built-in default is [approver, admin]".into()),
            });
        }

        // ── Ledger backend ───
        let valid_backends = ["memory", "sqlite"];
        if !valid_backends.contains(&self.ledger.backend.as_str()) {
            warnings.push(ConfigWarning {
                field: "ledger.backend".into(),
                message: format!("unknown backend '{}'", self.ledger.backend),
                severity: WarningSeverity::Error,
                hint: Some(format!("valid values: {}", valid_backends.join(", "))),
            });
        }

        // ── Policy rules ───
        let mut seen_ids = std::collections::HashSet::new();
        for (i, rule) in self.policy.rules.iter().enumerate() {
            if rule.id.is_empty() {
                warnings.push(ConfigWarning {
                    field: format!("policy.rules[{i}].id"),
                    message: "rule has no id".into(),
                    severity: WarningSeverity::Error,
                    hint: Some("every rule needs a stable identifier for audit records".into()),
                });
            } else if !seen_ids.insert(rule.id.clone()) {
                warnings.push(ConfigWarning {
                    field: format!("policy.rules[{i}].id"),
                    message: format!("duplicate rule id '{}'", rule.id),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }

        // ── Logging ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("valid values: {}", valid_levels.join(", "))),
            });
        }
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("valid values: {}", valid_formats.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("configuration errors:\n  - {}", errors.join("\n  - ")));
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_policy::Decision;

    #[test]
    fn test_defaults_validate_clean() {
        let config = WardenConfig::default();
        let warnings = config.validate().unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_zero_concurrency_is_an_error() {
        let mut config = WardenConfig::default();
        config.limits.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_rule_ids_rejected() {
        let mut config = WardenConfig::default();
        config.policy.rules = vec![
            RuleSpec {
                id: "r1".into(),
                decision: Decision::Allow,
                ..Default::default()
            },
            RuleSpec {
                id: "r1".into(),
                decision: Decision::Deny,
                ..Default::default()
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_level_is_only_a_warning() {
        let mut config = WardenConfig::default();
        config.logging.level = "verbose".into();
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, WarningSeverity::Warning);
    }

    #[test]
    fn test_full_toml_parses() {
        let toml_src = r#"
            mode = "live"

            [limits]
            rate_base = 10
            rate_burst = 5
            refill_per_sec = 2.0
            max_concurrent = 4

            [approvals]
            timeout_secs = 120

            [approvals.sod]
            repeat_approver_allowed = ["report.publish"]

            [ledger]
            backend = "sqlite"
            path = "audit.db"

            [[policy.rules]]
            id = "deny-exfil"
            action_kinds = ["net.post"]
            decision = "deny"
        "#;
        let config: WardenConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.mode, warden_core::ExecutionMode::Live);
        assert_eq!(config.limits.max_concurrent, 4);
        assert_eq!(config.approvals.timeout_secs, 120);
        assert_eq!(config.ledger.backend, "sqlite");
        assert_eq!(config.policy.rules.len(), 1);
        assert!(config.validate().is_ok());
    }
}
