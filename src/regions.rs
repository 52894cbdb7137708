//! Regional Scope Resolver: which regions a user may act in, right now.
//!
//! Region grants come from three places: identity-level `allowed_regions`
//! (possibly the `"*"` wildcard), per-role region grants on active role
//! assignments, and regions carried by active temporary access tokens. A
//! grant on a parent region covers its children through the region hierarchy,
//! bounded by a fixed maximum depth and guarded against cycles.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{AccessContext, Role, User};

/// Hierarchy resolution refuses chains deeper than this.
pub const MAX_INHERITANCE_DEPTH: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub parent: Option<String>,
}

/// Keyed store of regions, seeded at startup. Existence and activation are
/// checked before any scope resolution.
pub struct RegionStore {
    regions: HashMap<String, Region>,
}

impl RegionStore {
    pub fn new(regions: Vec<Region>) -> Self {
        Self {
            regions: regions.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    /// Operating regions for the console. Hubs nest under their metro
    /// region.
    pub fn seeded() -> Self {
        let region = |id: &str, name: &str, parent: Option<&str>| Region {
            id: id.to_string(),
            name: name.to_string(),
            active: true,
            parent: parent.map(str::to_string),
        };
        let mut regions = vec![
            region("ncr", "Metro Manila", None),
            region("ncr-east", "Metro Manila East", Some("ncr")),
            region("ncr-south", "Metro Manila South", Some("ncr")),
            region("cebu", "Metro Cebu", None),
            region("cebu-mandaue", "Mandaue Hub", Some("cebu")),
            region("davao", "Davao", None),
            region("bicol", "Bicol", None),
        ];
        // Legacy market kept for historical records, no longer dispatching.
        regions.push(Region {
            id: "baguio".to_string(),
            name: "Baguio".to_string(),
            active: false,
            parent: None,
        });
        Self::new(regions)
    }

    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.get(id)
    }

    /// The region itself plus its ancestors, nearest first. Rejects chains
    /// that exceed [`MAX_INHERITANCE_DEPTH`] or loop back on themselves.
    fn ancestor_chain(&self, id: &str) -> Result<Vec<String>, &'static str> {
        let mut chain = vec![id.to_string()];
        let mut seen: HashSet<&str> = HashSet::from([id]);
        let mut current = id;
        while let Some(parent) = self.regions.get(current).and_then(|r| r.parent.as_deref()) {
            if !seen.insert(parent) {
                return Err("circular_region_hierarchy_detected");
            }
            if chain.len() >= MAX_INHERITANCE_DEPTH {
                return Err("region_inheritance_depth_exceeded");
            }
            chain.push(parent.to_string());
            current = parent;
        }
        Ok(chain)
    }
}

/// Outcome of a regional scope resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RegionResolution {
    pub allowed: bool,
    pub reason: String,
    pub requires_mfa: bool,
}

impl RegionResolution {
    fn allow(reason: &str) -> Self {
        Self { allowed: true, reason: reason.to_string(), requires_mfa: false }
    }

    fn deny(reason: &str) -> Self {
        Self { allowed: false, reason: reason.to_string(), requires_mfa: false }
    }
}

/// Resolve whether `user` may act in `requested_region` given `context`.
pub fn resolve(
    store: &RegionStore,
    user: &User,
    requested_region: &str,
    context: &AccessContext,
    now: DateTime<Utc>,
) -> RegionResolution {
    let Some(region) = store.get(requested_region) else {
        return RegionResolution::deny("region_not_found");
    };
    if !region.active {
        return RegionResolution::deny("region_deactivated");
    }

    if user.has_wildcard_region() {
        return RegionResolution::allow("wildcard_region_access");
    }

    let chain = match store.ancestor_chain(requested_region) {
        Ok(chain) => chain,
        Err(reason) => return RegionResolution::deny(reason),
    };
    let covers = |grants: &[String]| grants.iter().any(|g| chain.contains(g));

    // Count distinct grant sources so multi-grant access is visible in the
    // audit trail.
    let mut contributing = 0usize;
    if covers(&user.allowed_regions) {
        contributing += 1;
    }
    for assignment in user.valid_roles_at(now) {
        if covers(&assignment.allowed_regions) {
            contributing += 1;
        }
    }
    for token in user.active_tokens.iter().filter(|t| t.is_active_at(now)) {
        if covers(&token.granted_regions) {
            contributing += 1;
        }
    }

    if contributing > 1 {
        return RegionResolution::allow("multi_region_access");
    }
    if contributing == 1 {
        return RegionResolution::allow("region_access_granted");
    }

    // Support may cross regions on a concrete case; without a case id the
    // cross-region path is closed.
    let is_support = user.valid_roles_at(now).any(|r| r.role == Role::Support);
    if is_support {
        match context.case_id.as_deref().map(str::trim) {
            Some(case_id) if is_valid_case_id(case_id) => {
                let mut resolution = RegionResolution::allow("cross_region_override");
                resolution.requires_mfa = true;
                return resolution;
            }
            _ => return RegionResolution::deny("region_access_denied"),
        }
    }

    RegionResolution::deny("region_access_denied")
}

fn is_valid_case_id(case_id: &str) -> bool {
    !case_id.is_empty()
        && case_id.len() <= 64
        && case_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
