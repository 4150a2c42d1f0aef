//! Status and classification enums for URL records
//!
//! Every enum here has a stable lowercase string form used both in the
//! ledger and in the JSON report.

use serde::Serialize;
use std::fmt;

/// Lifecycle status of a URL record
///
/// A record starts `Pending` and moves to `Fetched` or `Failed` exactly
/// once. Nothing ever returns to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    /// Discovered, not yet settled (may be in flight)
    Pending,

    /// Body fetched and stored in the mirror tree
    Fetched,

    /// Settled without a stored body; see the record's failure reason
    Failed,
}

impl UrlStatus {
    /// Returns true if no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true if `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: UrlStatus) -> bool {
        matches!(self, Self::Pending) && next.is_terminal()
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetched => "fetched",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "fetched" => Some(Self::Fetched),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Reason code of a failed URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Connection refused, DNS failure, TLS error, redirect loop, body read error
    Network,

    /// HTTP status 400-499
    #[serde(rename = "http_4xx")]
    Http4xx,

    /// HTTP status 500-599 (and any other non-success status)
    #[serde(rename = "http_5xx")]
    Http5xx,

    /// Request exceeded the per-request timeout
    Timeout,

    /// The body was fetched but could not be written to the mirror tree
    WriteError,

    /// Never claimed because the global time budget expired
    BudgetExhausted,

    /// Processing stopped unexpectedly (a download task panicked)
    Internal,
}

impl FailureReason {
    /// Classifies a non-success HTTP status code
    pub fn from_status(status: u16) -> Self {
        if (400..500).contains(&status) {
            Self::Http4xx
        } else {
            Self::Http5xx
        }
    }

    /// Returns true if a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Http5xx)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Http4xx => "http_4xx",
            Self::Http5xx => "http_5xx",
            Self::Timeout => "timeout",
            Self::WriteError => "write_error",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Internal => "internal",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "network" => Some(Self::Network),
            "http_4xx" => Some(Self::Http4xx),
            "http_5xx" => Some(Self::Http5xx),
            "timeout" => Some(Self::Timeout),
            "write_error" => Some(Self::WriteError),
            "budget_exhausted" => Some(Self::BudgetExhausted),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Whether a URL is an HTML page or a sub-resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Page,
    Resource,
}

impl Category {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Resource => "resource",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "page" => Some(Self::Page),
            "resource" => Some(Self::Resource),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// How a URL entered the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// The configured start URL
    Start,

    /// Listed in a sitemap advertised by a robots.txt `Sitemap:` line
    Robots,

    /// Listed in a sitemap at a conventional location
    Sitemap,

    /// Navigational link found in a fetched page
    Link,

    /// Sub-resource (image, script, stylesheet) of a fetched page
    Requisite,

    /// Found by scanning fetched HTML and CSS after the primary pass
    SecondPass,
}

impl Source {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Robots => "robots",
            Self::Sitemap => "sitemap",
            Self::Link => "link",
            Self::Requisite => "requisite",
            Self::SecondPass => "second_pass",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "robots" => Some(Self::Robots),
            "sitemap" => Some(Self::Sitemap),
            "link" => Some(Self::Link),
            "requisite" => Some(Self::Requisite),
            "second_pass" => Some(Self::SecondPass),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
