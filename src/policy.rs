//! Per-action admission policies.
//!
//! Every mutating operation on the site maps to an [`Action`]. Each action
//! carries a default [`ActionPolicy`]; deployments can override any of them
//! from a YAML file.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TurnstileError};

/// A mutating operation that is subject to admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Editing site text
    UpdateContent,
    CreateProgram,
    UpdateProgram,
    DeleteProgram,
    /// Adding, editing or removing team listings
    ManageTeam,
    /// Recording a manual donation
    LogDonation,
    SendDonorEmail,
    UpdateSettings,
}

impl Action {
    /// All actions, in a stable order.
    pub const ALL: [Action; 8] = [
        Action::UpdateContent,
        Action::CreateProgram,
        Action::UpdateProgram,
        Action::DeleteProgram,
        Action::ManageTeam,
        Action::LogDonation,
        Action::SendDonorEmail,
        Action::UpdateSettings,
    ];

    /// The wire/config name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::UpdateContent => "update_content",
            Action::CreateProgram => "create_program",
            Action::UpdateProgram => "update_program",
            Action::DeleteProgram => "delete_program",
            Action::ManageTeam => "manage_team",
            Action::LogDonation => "log_donation",
            Action::SendDonorEmail => "send_donor_email",
            Action::UpdateSettings => "update_settings",
        }
    }

    /// The built-in policy for this action.
    ///
    /// Donor email carries the tightest quota.
    pub fn default_policy(&self) -> ActionPolicy {
        let limit = match self {
            Action::UpdateContent | Action::UpdateProgram => 30,
            Action::ManageTeam | Action::LogDonation => 20,
            Action::CreateProgram | Action::DeleteProgram | Action::UpdateSettings => 10,
            Action::SendDonorEmail => 5,
        };
        ActionPolicy::new(limit, TimeUnit::Minute.duration())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = TurnstileError;

    fn from_str(s: &str) -> Result<Self> {
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| TurnstileError::Config(format!("unknown action: {}", s)))
    }
}

/// Named window lengths accepted in policy files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this time unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// How many calls an action admits per fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPolicy {
    /// Maximum admitted calls per window
    pub limit: u64,
    /// Window length
    pub window: Duration,
}

impl ActionPolicy {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// A policy entry as written in YAML.
///
/// Exactly one of `unit` or `window_ms` must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyRule {
    limit: u64,
    #[serde(default)]
    unit: Option<TimeUnit>,
    #[serde(default)]
    window_ms: Option<u64>,
}

impl PolicyRule {
    fn into_policy(self, action: Action) -> Result<ActionPolicy> {
        let window = match (self.unit, self.window_ms) {
            (Some(unit), None) => unit.duration(),
            (None, Some(ms)) => Duration::from_millis(ms),
            _ => {
                return Err(TurnstileError::Config(format!(
                    "policy for {} must set exactly one of `unit` or `window_ms`",
                    action
                )))
            }
        };

        if self.limit == 0 || window.is_zero() {
            return Err(TurnstileError::Config(format!(
                "policy for {} needs a positive limit and window",
                action
            )));
        }

        Ok(ActionPolicy::new(self.limit, window))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyFile {
    #[serde(default)]
    policies: HashMap<String, PolicyRule>,
}

/// Effective policy for every action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    policies: BTreeMap<Action, ActionPolicy>,
}

impl PolicyTable {
    /// The built-in policies.
    pub fn defaults() -> Self {
        let policies = Action::ALL
            .iter()
            .map(|action| (*action, action.default_policy()))
            .collect();
        Self { policies }
    }

    /// Load overrides from a YAML file on top of the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading admission policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load overrides from a YAML string on top of the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: PolicyFile =
            serde_yaml::from_str::<Option<PolicyFile>>(yaml)?.unwrap_or_default();
        let mut table = Self::defaults();

        for (name, rule) in file.policies {
            let action: Action = name.parse()?;
            let policy = rule.into_policy(action)?;
            debug!(
                action = %action,
                limit = policy.limit,
                window_ms = policy.window.as_millis() as u64,
                "Overriding admission policy"
            );
            table.set(action, policy);
        }

        Ok(table)
    }

    /// Policy for `action`.
    pub fn get(&self, action: Action) -> ActionPolicy {
        self.policies
            .get(&action)
            .copied()
            .unwrap_or_else(|| action.default_policy())
    }

    pub fn set(&mut self, action: Action, policy: ActionPolicy) {
        self.policies.insert(action, policy);
    }

    /// All policies, ordered by action.
    pub fn iter(&self) -> impl Iterator<Item = (Action, ActionPolicy)> + '_ {
        self.policies.iter().map(|(action, policy)| (*action, *policy))
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!("drop_tables".parse::<Action>().is_err());
    }

    #[test]
    fn test_defaults_cover_every_action() {
        let table = PolicyTable::defaults();
        assert_eq!(table.iter().count(), Action::ALL.len());

        let email = table.get(Action::SendDonorEmail);
        assert_eq!(email.limit, 5);
        assert_eq!(email.window, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_overrides() {
        let yaml = r#"
policies:
  send_donor_email:
    limit: 3
    unit: hour
  log_donation:
    limit: 50
    window_ms: 120000
"#;
        let table = PolicyTable::from_yaml(yaml).unwrap();

        assert_eq!(
            table.get(Action::SendDonorEmail),
            ActionPolicy::new(3, Duration::from_secs(3600))
        );
        assert_eq!(
            table.get(Action::LogDonation),
            ActionPolicy::new(50, Duration::from_millis(120_000))
        );
        // Untouched actions keep their defaults
        assert_eq!(
            table.get(Action::UpdateSettings),
            Action::UpdateSettings.default_policy()
        );
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        assert_eq!(PolicyTable::from_yaml("").unwrap(), PolicyTable::defaults());
        assert_eq!(
            PolicyTable::from_yaml("policies: {}").unwrap(),
            PolicyTable::defaults()
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let yaml = r#"
policies:
  mint_coins:
    limit: 1
    unit: second
"#;
        let err = PolicyTable::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_ambiguous_window_rejected() {
        let both = r#"
policies:
  manage_team:
    limit: 5
    unit: minute
    window_ms: 1000
"#;
        assert!(PolicyTable::from_yaml(both).is_err());

        let neither = r#"
policies:
  manage_team:
    limit: 5
"#;
        assert!(PolicyTable::from_yaml(neither).is_err());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let yaml = r#"
policies:
  create_program:
    limit: 0
    unit: minute
"#;
        assert!(PolicyTable::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_time_unit_duration() {
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }
}
