// src/health/aggregate.rs
use super::status::{parse_listing, HealthStatus, ListingLine};
use crate::config::ConfigError;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::warn;

/// Label used when a backend name does not yield a director.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Extracts a director label from a backend name using a pattern with
/// exactly one capture group.
#[derive(Debug, Clone)]
pub struct GroupExtractor {
    pattern: Regex,
}

impl GroupExtractor {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        // captures_len counts the implicit whole-match group
        let groups = regex.captures_len() - 1;
        if groups != 1 {
            return Err(ConfigError::CaptureGroups {
                pattern: pattern.to_string(),
                groups,
            });
        }

        Ok(Self { pattern: regex })
    }

    pub fn label<'a>(&self, name: &'a str) -> &'a str {
        self.pattern
            .captures(name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

#[derive(Debug, Clone)]
pub enum GroupingMode {
    Disabled,
    Enabled(GroupExtractor),
}

impl GroupingMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, GroupingMode::Enabled(_))
    }
}

/// What to do with listing lines that have fewer than three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingPolicy {
    /// Count the line as sick under the `unknown` label.
    #[default]
    Lenient,
    /// Drop the line from the cycle.
    Strict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub healthy: u64,
    pub sick: u64,
}

impl StateCounts {
    pub fn record(&mut self, status: HealthStatus) {
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Sick => self.sick += 1,
        }
    }

    pub fn get(&self, status: HealthStatus) -> u64 {
        match status {
            HealthStatus::Healthy => self.healthy,
            HealthStatus::Sick => self.sick,
        }
    }

    pub fn total(&self) -> u64 {
        self.healthy + self.sick
    }
}

/// Backend counts for one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Ungrouped(StateCounts),
    /// Every label seen in the cycle, each with both counts.
    Grouped(BTreeMap<String, StateCounts>),
}

impl Snapshot {
    pub fn total(&self) -> u64 {
        match self {
            Snapshot::Ungrouped(counts) => counts.total(),
            Snapshot::Grouped(groups) => groups.values().map(StateCounts::total).sum(),
        }
    }

    /// Flattens into `(status, director, count)` series.
    pub fn series(&self) -> Vec<(HealthStatus, Option<&str>, u64)> {
        let statuses = [HealthStatus::Healthy, HealthStatus::Sick];
        match self {
            Snapshot::Ungrouped(counts) => statuses
                .iter()
                .map(|s| (*s, None, counts.get(*s)))
                .collect(),
            Snapshot::Grouped(groups) => groups
                .iter()
                .flat_map(|(label, counts)| {
                    statuses
                        .iter()
                        .map(move |s| (*s, Some(label.as_str()), counts.get(*s)))
                })
                .collect(),
        }
    }
}

/// Turns `backend.list` bodies into snapshots.
#[derive(Debug, Clone)]
pub struct Aggregator {
    grouping: GroupingMode,
    policy: ListingPolicy,
}

impl Aggregator {
    pub fn new(grouping: GroupingMode, policy: ListingPolicy) -> Self {
        Self { grouping, policy }
    }

    pub fn grouping(&self) -> &GroupingMode {
        &self.grouping
    }

    pub fn aggregate(&self, body: &str) -> Snapshot {
        let mut ungrouped = StateCounts::default();
        let mut grouped: BTreeMap<String, StateCounts> = BTreeMap::new();

        for line in parse_listing(body) {
            let (label, status) = match line {
                ListingLine::Backend(record) => {
                    let label = match &self.grouping {
                        GroupingMode::Enabled(extractor) => extractor.label(record.name),
                        GroupingMode::Disabled => UNKNOWN_LABEL,
                    };
                    (label, record.status())
                }
                ListingLine::Malformed(raw) => match self.policy {
                    ListingPolicy::Lenient => (UNKNOWN_LABEL, HealthStatus::Sick),
                    ListingPolicy::Strict => {
                        warn!(line = raw, "Skipping malformed backend line");
                        continue;
                    }
                },
            };

            match &self.grouping {
                GroupingMode::Enabled(_) => grouped.entry(label.to_string()).or_default().record(status),
                GroupingMode::Disabled => ungrouped.record(status),
            }
        }

        match &self.grouping {
            GroupingMode::Enabled(_) => Snapshot::Grouped(grouped),
            GroupingMode::Disabled => Snapshot::Ungrouped(ungrouped),
        }
    }
}
