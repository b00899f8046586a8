//! TOML-loadable pipeline configuration.

use serde::Deserialize;

use ingress4_core::IfaceId;

/// Default cap on protocol re-submission per packet. Far above any
/// legitimate encapsulation depth; a handler cycle trips the cap fast.
pub const DEFAULT_MAX_RESUBMITS: usize = 16;

/// Top-level ingress configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngressConfig {
    /// Maximum protocol re-submissions (encapsulation unwraps) for one
    /// packet before the traversal is treated as a handler loop.
    #[serde(default = "default_max_resubmits")]
    pub max_resubmits: usize,

    /// Whether interfaces accept source-routed datagrams by default.
    #[serde(default)]
    pub accept_source_route: bool,

    /// Interfaces whose source-routing policy differs from the default.
    #[serde(default)]
    pub source_route_overrides: Vec<SourceRouteOverride>,

    /// Number of statistics shards. Zero means one per available core.
    #[serde(default)]
    pub stats_shards: usize,
}

/// A per-interface source-routing policy override.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRouteOverride {
    pub iface: u32,
    pub accept: bool,
}

fn default_max_resubmits() -> usize {
    DEFAULT_MAX_RESUBMITS
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            max_resubmits: DEFAULT_MAX_RESUBMITS,
            accept_source_route: false,
            source_route_overrides: Vec::new(),
            stats_shards: 0,
        }
    }
}

impl IngressConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Source-routing policy for a specific ingress interface.
    pub fn source_route_permitted(&self, iface: IfaceId) -> bool {
        self.source_route_overrides
            .iter()
            .rev()
            .find(|o| o.iface == iface.index())
            .map_or(self.accept_source_route, |o| o.accept)
    }
}
