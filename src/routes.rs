//! Route Registry & Path Rewriter
//!
//! The gateway's route table is plain data: one `RouteDescriptor` per mounted prefix, each
//! carrying its upstream and an explicit `AuthPolicy`. Which sub-paths are public is decided
//! here and nowhere else, so no amount of router or middleware ordering can change it.

use std::collections::BTreeSet;

use reqwest::Url;

use crate::{config::GatewayConfig, error::GatewayError};

/// AuthPolicy
///
/// Decides, per request, whether the verifier runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Never verify.
    Public,
    /// Always verify.
    Protected,
    /// Sub-paths in the set are public; everything else under the prefix is protected.
    /// Entries are stored lowercased and matched case-insensitively.
    PathList(BTreeSet<String>),
}

impl AuthPolicy {
    pub fn path_list<I, S>(exempt: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        AuthPolicy::PathList(
            exempt
                .into_iter()
                .map(|p| normalize_sub_path(p.as_ref()))
                .collect(),
        )
    }

    /// Whether a request for `sub_path` (the path with the route prefix removed)
    /// must present a valid token.
    pub fn requires_auth(&self, sub_path: &str) -> bool {
        match self {
            AuthPolicy::Public => false,
            AuthPolicy::Protected => true,
            AuthPolicy::PathList(exempt) => !exempt.contains(&normalize_sub_path(sub_path)),
        }
    }
}

fn normalize_sub_path(path: &str) -> String {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    trimmed.to_ascii_lowercase()
}

/// RouteDescriptor
///
/// Immutable after startup.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    /// Leading path segment(s), e.g. `/api/events`. No trailing slash.
    pub prefix: String,
    /// Where the stripped remainder is appended.
    pub upstream: Url,
    pub auth_policy: AuthPolicy,
    /// Drop the inbound `Authorization` header before forwarding.
    pub strip_authorization: bool,
}

impl RouteDescriptor {
    pub fn new(prefix: impl Into<String>, upstream: Url, auth_policy: AuthPolicy) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches('/').to_string();
        Self {
            prefix,
            upstream,
            auth_policy,
            strip_authorization: false,
        }
    }

    pub fn stripping_authorization(mut self) -> Self {
        self.strip_authorization = true;
        self
    }

    /// Returns the remainder of `path` after this prefix when the prefix matches on a
    /// segment boundary (ASCII case-insensitive), e.g. `/api/events` matches `/api/events`
    /// and `/api/events/42` but not `/api/eventsx`.
    fn strip_prefix<'p>(&self, path: &'p str) -> Option<&'p str> {
        let len = self.prefix.len();
        let head = path.get(..len)?;
        if !head.eq_ignore_ascii_case(&self.prefix) {
            return None;
        }
        let rest = &path[len..];
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }
}

/// RouteMatch
///
/// The outcome of a registry lookup for one request.
#[derive(Debug, Clone, Copy)]
pub struct RouteMatch<'r, 'p> {
    pub route: &'r RouteDescriptor,
    /// The request path with the matched prefix removed. May be empty.
    pub sub_path: &'p str,
}

impl RouteMatch<'_, '_> {
    pub fn requires_auth(&self) -> bool {
        self.route.auth_policy.requires_auth(self.sub_path)
    }

    /// Builds the upstream target: base URL path + stripped remainder + original query.
    /// The remainder is copied as received, so percent-encoding is preserved.
    pub fn target_url(&self, query: Option<&str>) -> Result<Url, GatewayError> {
        let base = self.route.upstream.as_str().trim_end_matches('/');
        let mut target = String::with_capacity(base.len() + self.sub_path.len() + 1);
        target.push_str(base);
        if self.sub_path.is_empty() {
            target.push('/');
        } else {
            target.push_str(self.sub_path);
        }
        if let Some(query) = query {
            target.push('?');
            target.push_str(query);
        }
        Url::parse(&target)
            .map_err(|e| GatewayError::internal(format!("could not build upstream URL: {e}")))
    }
}

/// RouteRegistry
///
/// Built once, shared read-only. Lookups pick the longest matching prefix.
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    routes: Vec<RouteDescriptor>,
}

impl RouteRegistry {
    pub fn new(routes: Vec<RouteDescriptor>) -> Self {
        Self { routes }
    }

    /// from_config
    ///
    /// The platform's route table:
    ///
    /// | Prefix            | Upstream                 | Auth                                   |
    /// |-------------------|--------------------------|----------------------------------------|
    /// | `/api/auth`       | `AUTH_SERVICE_URL/auth`  | `/register`, `/login` public, rest protected |
    /// | `/api/events`     | `EVENT_SERVICE_URL`      | protected                              |
    /// | `/api/attendance` | `ATTENDANCE_SERVICE_URL` | protected                              |
    /// | `/api/venue`      | `VENUE_SERVICE_URL`      | protected                              |
    ///
    /// `/validate` stays protected: it exists to check a caller-supplied token.
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(vec![
            RouteDescriptor::new(
                "/api/auth",
                with_path_suffix(&config.auth_service_url, "/auth"),
                AuthPolicy::path_list(["/register", "/login"]),
            ),
            RouteDescriptor::new(
                "/api/events",
                config.event_service_url.clone(),
                AuthPolicy::Protected,
            ),
            RouteDescriptor::new(
                "/api/attendance",
                config.attendance_service_url.clone(),
                AuthPolicy::Protected,
            ),
            RouteDescriptor::new(
                "/api/venue",
                config.venue_service_url.clone(),
                AuthPolicy::Protected,
            ),
        ])
    }

    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn resolve<'r, 'p>(&'r self, path: &'p str) -> Option<RouteMatch<'r, 'p>> {
        self.routes
            .iter()
            .filter_map(|route| {
                route
                    .strip_prefix(path)
                    .map(|sub_path| RouteMatch { route, sub_path })
            })
            .max_by_key(|m| m.route.prefix.len())
    }
}

fn with_path_suffix(base: &Url, suffix: &str) -> Url {
    let mut url = base.clone();
    let path = format!("{}{}", base.path().trim_end_matches('/'), suffix);
    url.set_path(&path);
    url
}
