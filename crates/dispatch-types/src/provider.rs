//! Provider types for the dispatch system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a service provider.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProviderId(pub Uuid);

impl ProviderId {
	/// Generates a fresh random identifier.
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for ProviderId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ProviderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// An independent service provider registered in the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
	pub id: ProviderId,
	pub name: String,
	/// Unique within the directory.
	pub email: String,
	pub phone: String,
	/// Service types this provider takes, e.g. ["plumbing", "hvac"].
	pub capabilities: Vec<String>,
	/// The sole eligibility gate for auto-assignment.
	pub available: bool,
	/// Ranking signal for candidate ordering. Higher is better.
	pub rating: f64,
	pub created_at: DateTime<Utc>,
}

impl Provider {
	/// Whether this provider offers the given service type.
	pub fn offers(&self, service_type: &str) -> bool {
		self.capabilities.iter().any(|c| c == service_type)
	}
}

/// Fields required to register a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProvider {
	pub name: String,
	pub email: String,
	pub phone: String,
	pub capabilities: Vec<String>,
	#[serde(default = "default_rating")]
	pub rating: f64,
}

fn default_rating() -> f64 {
	5.0
}
