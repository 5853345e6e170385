//! Classification of unit paths.
//!
//! Layout: `live/<account>/<environment>/<project>[/<region>]/<resource-type>[/<name>...]`.
//! The optional region segment is recognised only through [`KNOWN_REGIONS`];
//! a resource-type directory that happens to carry a region's name is read as
//! a region. That ambiguity is accepted rather than guessed around.

use serde::Serialize;

/// First segment of every classifiable path.
pub const ROOT_MARKER: &str = "live";

/// Region identifiers recognised in the fifth path segment.
pub const KNOWN_REGIONS: &[&str] = &[
    "asia-east1",
    "asia-northeast1",
    "asia-south1",
    "asia-southeast1",
    "australia-southeast1",
    "europe-north1",
    "europe-west1",
    "europe-west2",
    "europe-west3",
    "europe-west4",
    "northamerica-northeast1",
    "southamerica-east1",
    "us-central1",
    "us-east1",
    "us-east4",
    "us-west1",
    "us-west2",
];

pub fn is_known_region(segment: &str) -> bool {
    KNOWN_REGIONS.contains(&segment)
}

/// Parts of a unit path. Every field is absent when the path is too short
/// or does not start with [`ROOT_MARKER`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathComponents {
    pub account: Option<String>,
    pub environment: Option<String>,
    pub project: Option<String>,
    pub region: Option<String>,
    pub resource_type: Option<String>,
    pub resource_name: Option<String>,
}

impl PathComponents {
    /// Rebuild the path. `None` unless account, environment, project and
    /// resource type are all present.
    pub fn to_path(&self) -> Option<String> {
        Some(build_path(
            self.account.as_deref()?,
            self.environment.as_deref()?,
            self.project.as_deref()?,
            self.resource_type.as_deref()?,
            self.region.as_deref(),
            self.resource_name.as_deref(),
        ))
    }
}

pub fn parse_path(relative: &str) -> PathComponents {
    let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();

    let mut parts = PathComponents::default();
    if segments.first() != Some(&ROOT_MARKER) {
        return parts;
    }

    let owned = |i: usize| segments.get(i).map(|s| s.to_string());
    parts.account = owned(1);
    parts.environment = owned(2);
    parts.project = owned(3);

    let mut next = 4;
    if let Some(segment) = segments.get(next) {
        if is_known_region(segment) {
            parts.region = Some(segment.to_string());
            next += 1;
        }
    }

    parts.resource_type = owned(next);
    next += 1;

    if segments.len() > next {
        parts.resource_name = Some(segments[next..].join("/"));
    }

    parts
}

pub fn build_path(
    account: &str,
    environment: &str,
    project: &str,
    resource_type: &str,
    region: Option<&str>,
    resource_name: Option<&str>,
) -> String {
    let mut segments = vec![ROOT_MARKER, account, environment, project];
    if let Some(r) = region {
        segments.push(r);
    }
    segments.push(resource_type);
    if let Some(n) = resource_name {
        segments.push(n);
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_without_region() {
        let p = parse_path("live/acct1/dev/proj1/compute/web");
        assert_eq!(p.account.as_deref(), Some("acct1"));
        assert_eq!(p.environment.as_deref(), Some("dev"));
        assert_eq!(p.project.as_deref(), Some("proj1"));
        assert_eq!(p.region, None);
        assert_eq!(p.resource_type.as_deref(), Some("compute"));
        assert_eq!(p.resource_name.as_deref(), Some("web"));
    }

    #[test]
    fn region_shifts_resource_type() {
        let p = parse_path("live/acct1/prod/proj1/europe-west2/compute/sql-server-01/instance-template");
        assert_eq!(p.region.as_deref(), Some("europe-west2"));
        assert_eq!(p.resource_type.as_deref(), Some("compute"));
        assert_eq!(
            p.resource_name.as_deref(),
            Some("sql-server-01/instance-template")
        );
    }

    #[test]
    fn wrong_root_is_all_absent() {
        assert_eq!(parse_path("modules/acct/dev/proj/compute"), PathComponents::default());
        assert_eq!(parse_path(""), PathComponents::default());
    }

    #[test]
    fn short_path_fills_positionally() {
        let p = parse_path("live/acct1/dev");
        assert_eq!(p.account.as_deref(), Some("acct1"));
        assert_eq!(p.environment.as_deref(), Some("dev"));
        assert_eq!(p.project, None);
        assert_eq!(p.resource_type, None);
        assert_eq!(p.to_path(), None);
    }

    #[test]
    fn empty_segments_are_ignored() {
        let p = parse_path("/live//acct1/dev/proj1/vpc-network/");
        assert_eq!(p.resource_type.as_deref(), Some("vpc-network"));
        assert_eq!(p.resource_name, None);
    }

    #[test]
    fn round_trips() {
        let paths = [
            "live/a/dev/p/folder",
            "live/a/dev/p/compute/web",
            "live/a/prod/p/us-central1/sqlserver/main",
            "live/a/prod/p/asia-southeast1/compute/web/instance-template",
            "live/a/staging/p/europe-west2/secrets",
        ];
        for path in paths {
            assert_eq!(parse_path(path).to_path().as_deref(), Some(path));
        }
    }
}
