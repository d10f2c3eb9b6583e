//! Addressing server-defined resource types without discovery
use std::{fmt, str::FromStr};

use kube::core::ApiResource;

use crate::error::CoordinateError;

/// The (group, version, plural) triple naming a resource type on the server.
///
/// The coordinate is not validated against any schema. An unknown coordinate
/// only surfaces as a `NotFound` when it is listed.
///
/// Coordinates parse from the `kubectl` style `plural.group/version`, e.g.
/// `widgets.example.com/v1`, or `plural/version` for the core group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceCoordinate {
    /// API group, empty for the core group
    pub group: String,
    /// API version within the group
    pub version: String,
    /// Plural resource name as used in URLs
    pub plural: String,
}

impl ResourceCoordinate {
    /// Construct a coordinate from its parts
    pub fn new(group: &str, version: &str, plural: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            plural: plural.to_string(),
        }
    }

    /// The `apiVersion` string objects of this type carry
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Dynamic type information for `Api<DynamicObject>`
    ///
    /// The kind is left empty: it is unknown without discovery and not needed for listing.
    pub(crate) fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: String::new(),
            plural: self.plural.clone(),
        }
    }
}

impl fmt::Display for ResourceCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.plural, self.version)
        } else {
            write!(f, "{}.{}/{}", self.plural, self.group, self.version)
        }
    }
}

impl FromStr for ResourceCoordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, version) = s
            .split_once('/')
            .ok_or_else(|| CoordinateError::MissingVersion(s.to_string()))?;
        if version.is_empty() || version.contains('/') {
            return Err(CoordinateError::EmptyVersion(s.to_string()));
        }
        let (plural, group) = resource.split_once('.').unwrap_or((resource, ""));
        if plural.is_empty() {
            return Err(CoordinateError::EmptyResource(s.to_string()));
        }
        Ok(Self::new(group, version, plural))
    }
}
