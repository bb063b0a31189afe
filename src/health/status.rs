// src/health/status.rs
use std::fmt;

/// Prefix of the column header line in a `backend.list` body.
pub const LISTING_HEADER_PREFIX: &str = "Backend name ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HealthStatus {
    Healthy,
    Sick,
}

impl HealthStatus {
    /// A backend is healthy only when the admin column is not `sick` and the
    /// probe column reads exactly `Healthy`.
    pub fn classify(admin: &str, health: &str) -> Self {
        if admin != "sick" && health == "Healthy" {
            HealthStatus::Healthy
        } else {
            HealthStatus::Sick
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Sick => "sick",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a `backend.list` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRecord<'a> {
    pub name: &'a str,
    pub admin: &'a str,
    pub health: &'a str,
}

impl<'a> BackendRecord<'a> {
    pub fn status(&self) -> HealthStatus {
        HealthStatus::classify(self.admin, self.health)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingLine<'a> {
    Backend(BackendRecord<'a>),
    /// Fewer than three whitespace-separated fields.
    Malformed(&'a str),
}

/// Splits a listing body into rows, dropping the header and blank lines.
pub fn parse_listing(body: &str) -> impl Iterator<Item = ListingLine<'_>> {
    body.lines()
        .filter(|line| !line.starts_with(LISTING_HEADER_PREFIX))
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(name), Some(admin), Some(health)) => {
                    ListingLine::Backend(BackendRecord { name, admin, health })
                }
                _ => ListingLine::Malformed(line),
            }
        })
}
