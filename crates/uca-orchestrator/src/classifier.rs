//! Failure classification for update commands
//!
//! Rules are plain data: a reason, the commands they apply to, the output
//! markers that trigger them and the hint shown to the user. Rules are tried
//! in order and the first match wins.

use uca_core::{ClassifierConfig, FailureReason};

/// Which update commands a rule applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Any,
    /// `npm install` / `npm update`
    NpmGlobalMutate,
    /// Commands whose program is exactly this name
    Program(String),
}

impl Scope {
    fn applies(&self, args: &[String]) -> bool {
        match self {
            Self::Any => true,
            Self::NpmGlobalMutate => is_npm_global_mutate(args),
            Self::Program(program) => args.first().is_some_and(|p| p == program),
        }
    }
}

/// A single output pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Case-insensitive substring
    Contains(String),
    /// Case-sensitive substring
    Exact(String),
    /// Every case-insensitive substring must be present
    AllOf(Vec<String>),
}

impl Marker {
    pub fn contains(text: &str) -> Self {
        Self::Contains(text.to_lowercase())
    }

    fn matches(&self, output: &str, lower: &str) -> bool {
        match self {
            Self::Contains(text) => lower.contains(text.as_str()),
            Self::Exact(text) => output.contains(text.as_str()),
            Self::AllOf(parts) => parts.iter().all(|part| lower.contains(part.as_str())),
        }
    }
}

/// One classification rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRule {
    pub reason: FailureReason,
    pub scope: Scope,
    pub markers: Vec<Marker>,
    pub hint: String,
}

impl FailureRule {
    fn new(reason: FailureReason, scope: Scope, markers: Vec<Marker>, hint: &str) -> Self {
        Self {
            reason,
            scope,
            markers,
            hint: hint.to_string(),
        }
    }

    fn matches(&self, args: &[String], output: &str, lower: &str) -> bool {
        self.scope.applies(args) && self.markers.iter().any(|m| m.matches(output, lower))
    }
}

/// Classification outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub reason: FailureReason,
    pub hint: String,
}

/// Priority-ordered failure rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    rules: Vec<FailureRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Classifier {
    pub fn new(rules: Vec<FailureRule>) -> Self {
        Self { rules }
    }

    /// Default rules extended with markers from the configuration file
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let mut classifier = Self::default();
        for (reason, markers) in config.markers() {
            classifier.extend(&reason, markers.iter().map(|m| Marker::contains(m)));
        }
        classifier
    }

    /// Append markers to the rule for `reason`
    pub fn extend(&mut self, reason: &FailureReason, markers: impl IntoIterator<Item = Marker>) {
        if let Some(rule) = self.rules.iter_mut().find(|rule| &rule.reason == reason) {
            rule.markers.extend(markers);
        }
    }

    pub fn rules(&self) -> &[FailureRule] {
        &self.rules
    }

    /// Classify a failed command by its output; `None` when nothing matched
    pub fn classify(&self, args: &[String], output: &str) -> Option<Classification> {
        let lower = output.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(args, output, &lower))
            .map(|rule| Classification {
                reason: rule.reason.clone(),
                hint: rule.hint.clone(),
            })
    }

    /// Whether the output shows npm's rename race, which warrants one retry
    pub fn is_npm_rename_failure(&self, args: &[String], output: &str) -> bool {
        let lower = output.to_lowercase();
        self.rules
            .iter()
            .filter(|rule| rule.reason == FailureReason::NpmNotEmpty)
            .any(|rule| rule.matches(args, output, &lower))
    }
}

/// `npm install ...` or `npm update ...`
pub fn is_npm_global_mutate(args: &[String]) -> bool {
    match args {
        [program, sub, ..] => program == "npm" && matches!(sub.as_str(), "install" | "update"),
        _ => false,
    }
}

/// Built-in rules in priority order
pub fn default_rules() -> Vec<FailureRule> {
    vec![
        FailureRule::new(
            FailureReason::Quota,
            Scope::Any,
            vec![
                Marker::Exact("TerminalQuotaError".to_string()),
                Marker::contains("exhausted your capacity"),
                Marker::contains("quota will reset"),
            ],
            "quota exceeded; retry later or update via npm (@google/gemini-cli)",
        ),
        FailureRule::new(
            FailureReason::NpmNotEmpty,
            Scope::NpmGlobalMutate,
            vec![
                Marker::Exact("ENOTEMPTY".to_string()),
                Marker::Exact("errno -66".to_string()),
                Marker::contains("directory not empty"),
            ],
            "npm rename failed; retry or remove leftover temp directory under the global npm prefix",
        ),
        FailureRule::new(
            FailureReason::Permission,
            Scope::Any,
            vec![
                Marker::contains("eacces"),
                Marker::contains("eperm"),
                Marker::contains("permission denied"),
            ],
            "permission error; check your global install prefix and file permissions",
        ),
        FailureRule::new(
            FailureReason::Network,
            Scope::Any,
            vec![
                Marker::contains("etimedout"),
                Marker::contains("timed out"),
                Marker::contains("econnreset"),
                Marker::contains("enotfound"),
                Marker::contains("eai_again"),
                Marker::contains("econnrefused"),
                Marker::contains("socket hang up"),
            ],
            "network error; check connectivity/proxy/VPN and retry",
        ),
        FailureRule::new(
            FailureReason::Tls,
            Scope::Any,
            vec![
                Marker::contains("self signed certificate"),
                Marker::contains("unable to get local issuer certificate"),
                Marker::contains("cert has expired"),
                Marker::contains("ssl routines"),
                Marker::AllOf(vec!["tls".to_string(), "certificate".to_string()]),
            ],
            "TLS/CA error; check corporate proxy settings or system certificates",
        ),
        FailureRule::new(
            FailureReason::BrewBusy,
            Scope::Program("brew".to_string()),
            vec![
                Marker::contains("another active homebrew update process"),
                Marker::contains("homebrew is already updating"),
                Marker::contains("cannot install in homebrew prefix"),
            ],
            "homebrew is locked/busy; wait for other brew process and retry",
        ),
    ]
}
