//! # Router Composition
//!
//! The HTTP surface is assembled from an ordered [`RouteTable`].  Each [`Mount`] pairs a
//! path prefix with the routes of one resource collaborator; composition nests every
//! mount under its prefix (so the collaborator sees paths with the prefix stripped),
//! serves the root self-description generated from the same table, and wraps the
//! result in the cross-cutting stages:
//!
//! ```text
//! TraceLayer ─▶ CORS ─▶ error stage ─▶ panic catcher ─▶ body limit ─▶ routes | 404
//! ```
//!
//! Because the root document is derived from the table, the advertised endpoints
//! cannot drift from what is actually mounted.
//!
//! Prefixes may share a root (`/api/v1` and `/api/v1/user`).  Axum resolves nested
//! routes by their full path, so overlap is harmless unless the shorter mount owns a
//! route that also matches traffic meant for the longer one.  [`RouteTable::shadowing`]
//! finds such pairs and [`compose`] refuses to build a table that has any.

use std::fmt::{Display, Formatter, Result as FmtResult};

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::middleware;
use axum::response::Json;
use axum::routing::{MethodRouter, get};
use serde::{Serialize, Serializer};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::fault;

/// Largest accepted JSON request body.
pub const JSON_BODY_LIMIT: usize = 100 * 1024;

/// Message of the root self-description.
pub const ROOT_MESSAGE: &str = "LIFEEC API is running";

////////////////////////////////////////////// Routes //////////////////////////////////////////////

/// A collaborator's router together with the paths it registered.
///
/// Building routes through this type is what lets the table reason about overlap
/// without trusting a hand-maintained list.
pub struct Routes<S = ()> {
    router: Router<S>,
    paths: Vec<&'static str>,
}

impl<S> Routes<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// An empty set of routes.
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            paths: Vec::new(),
        }
    }

    /// Adds `method_router` at `path` (relative to the eventual mount prefix).
    pub fn route(mut self, path: &'static str, method_router: MethodRouter<S>) -> Self {
        self.router = self.router.route(path, method_router);
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
        self
    }

    /// Supplies the state the handlers need.
    pub fn with_state(self, state: S) -> Routes {
        Routes {
            router: self.router.with_state(state),
            paths: self.paths,
        }
    }

    /// The registered paths, in registration order.
    pub fn paths(&self) -> &[&'static str] {
        &self.paths
    }
}

impl<S> Default for Routes<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A resource collaborator: anything that can contribute routes under a prefix.
pub trait Resource {
    /// The collaborator's routes, relative to its mount prefix.
    fn routes(&self) -> Routes;
}

///////////////////////////////////////////// RouteTable ///////////////////////////////////////////

/// One entry of the route table.
pub struct Mount {
    prefix: String,
    key: Option<String>,
    routes: Routes,
}

impl Mount {
    /// The path prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The name under which the root document advertises this mount, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// The collaborator's relative paths.
    pub fn paths(&self) -> &[&'static str] {
        self.routes.paths()
    }
}

/// Two mounts whose routes collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadowing {
    /// Prefix of the mount whose route captures foreign traffic.
    pub outer: String,
    /// The offending route of the outer mount.
    pub path: String,
    /// Prefix of the mount that loses traffic.
    pub inner: String,
}

impl Display for Shadowing {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "route {}{} shadows mount {}",
            self.outer, self.path, self.inner
        )
    }
}

/// Why a route table cannot be composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTableError {
    /// A prefix is not of the form `/segment[/segment...]` without parameters.
    InvalidPrefix(String),
    /// Two mounts advertise the same key.
    DuplicateKey(String),
    /// A mount's route captures another mount's traffic.
    Shadowed(Shadowing),
}

impl Display for RouteTableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RouteTableError::InvalidPrefix(prefix) => write!(f, "invalid mount prefix {:?}", prefix),
            RouteTableError::DuplicateKey(key) => write!(f, "endpoint key {:?} advertised twice", key),
            RouteTableError::Shadowed(shadowing) => write!(f, "{}", shadowing),
        }
    }
}

impl std::error::Error for RouteTableError {}

/// The ordered mapping from path prefix to resource collaborator.
#[derive(Default)]
pub struct RouteTable {
    mounts: Vec<Mount>,
}

impl RouteTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts `resource` at `prefix` and advertises it as `key` in the root document.
    pub fn mount(self, prefix: impl Into<String>, key: impl Into<String>, resource: &dyn Resource) -> Self {
        self.push(prefix.into(), Some(key.into()), resource.routes())
    }

    /// Mounts `resource` at `prefix` without advertising it.
    pub fn mount_unlisted(self, prefix: impl Into<String>, resource: &dyn Resource) -> Self {
        self.push(prefix.into(), None, resource.routes())
    }

    fn push(mut self, prefix: String, key: Option<String>, routes: Routes) -> Self {
        self.mounts.push(Mount { prefix, key, routes });
        self
    }

    /// The mounts in registration order.
    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Advertised `key → prefix` pairs, in table order.
    pub fn endpoints(&self) -> Vec<(String, String)> {
        self.mounts
            .iter()
            .filter_map(|m| m.key.clone().map(|key| (key, m.prefix.clone())))
            .collect()
    }

    /// Every concrete entry point: `GET /` plus each mount's paths under its prefix.
    pub fn entry_points(&self) -> Vec<String> {
        let mut points = vec!["/".to_string()];
        for mount in &self.mounts {
            for path in mount.paths() {
                points.push(join_path(&mount.prefix, path));
            }
        }
        points
    }

    /// Pairs of mounts where a route of one captures traffic meant for the other.
    ///
    /// A mount at `/a` shadows a mount at `/a/b` when it owns a route whose first
    /// segment is `b`, a parameter, or a wildcard.  Two mounts at the same prefix
    /// shadow each other when they register the same path.
    pub fn shadowing(&self) -> Vec<Shadowing> {
        let mut found = Vec::new();
        for (i, outer) in self.mounts.iter().enumerate() {
            for (j, inner) in self.mounts.iter().enumerate() {
                if i == j {
                    continue;
                }
                if outer.prefix == inner.prefix {
                    if i < j {
                        for path in outer.paths() {
                            if inner.paths().contains(path) {
                                found.push(Shadowing {
                                    outer: outer.prefix.clone(),
                                    path: path.to_string(),
                                    inner: inner.prefix.clone(),
                                });
                            }
                        }
                    }
                    continue;
                }
                let Some(rest) = inner
                    .prefix
                    .strip_prefix(outer.prefix.as_str())
                    .and_then(|rest| rest.strip_prefix('/'))
                else {
                    continue;
                };
                let next = rest.split('/').next().unwrap_or_default();
                for path in outer.paths() {
                    let first = path
                        .trim_start_matches('/')
                        .split('/')
                        .next()
                        .unwrap_or_default();
                    if first == next || first.starts_with(':') || first.starts_with('*') {
                        found.push(Shadowing {
                            outer: outer.prefix.clone(),
                            path: path.to_string(),
                            inner: inner.prefix.clone(),
                        });
                    }
                }
            }
        }
        found
    }

    /// Checks prefixes, keys, and shadowing.
    pub fn validate(&self) -> Result<(), RouteTableError> {
        let mut keys = Vec::new();
        for mount in &self.mounts {
            if !valid_prefix(&mount.prefix) {
                return Err(RouteTableError::InvalidPrefix(mount.prefix.clone()));
            }
            if let Some(key) = &mount.key {
                if keys.contains(&key) {
                    return Err(RouteTableError::DuplicateKey(key.clone()));
                }
                keys.push(key);
            }
        }
        match self.shadowing().into_iter().next() {
            Some(shadowing) => Err(RouteTableError::Shadowed(shadowing)),
            None => Ok(()),
        }
    }
}

fn valid_prefix(prefix: &str) -> bool {
    let Some(rest) = prefix.strip_prefix('/') else {
        return false;
    };
    !rest.is_empty()
        && rest.split('/').all(|segment| {
            !segment.is_empty() && !segment.starts_with(':') && !segment.starts_with('*')
        })
}

fn join_path(prefix: &str, path: &str) -> String {
    if path == "/" {
        prefix.to_string()
    } else {
        format!("{}{}", prefix, path)
    }
}

/////////////////////////////////////////// Root document ///////////////////////////////////////////

/// Body of `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootDocument {
    /// Always `"success"`.
    pub status: String,
    /// Service banner.
    pub message: String,
    /// Advertised `key → prefix` pairs; serialized as an object in table order.
    #[serde(serialize_with = "serialize_endpoints")]
    pub endpoints: Vec<(String, String)>,
}

fn serialize_endpoints<S: Serializer>(
    endpoints: &[(String, String)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(endpoints.iter().map(|(key, prefix)| (key, prefix)))
}

impl RootDocument {
    /// Describes `table`.
    pub fn describe(table: &RouteTable) -> Self {
        Self {
            status: "success".to_string(),
            message: ROOT_MESSAGE.to_string(),
            endpoints: table.endpoints(),
        }
    }
}

////////////////////////////////////////////// compose //////////////////////////////////////////////

/// Builds the application router from `table`.
///
/// Mounts are nested in table order, followed by the not-found fallback; the error
/// stage, CORS policy, body limit and request tracing wrap everything, including the
/// fallback.
pub fn compose(table: RouteTable, config: &Config) -> Result<Router, RouteTableError> {
    table.validate()?;

    let document = RootDocument::describe(&table);
    let mut app = Router::new().route(
        "/",
        get(move || {
            let document = document.clone();
            async move { Json(document) }
        }),
    );
    for mount in table.mounts {
        app = app.nest(&mount.prefix, mount.routes.router);
    }

    // a path that exists under another method is as unmatched as one that does not exist
    Ok(app
        .method_not_allowed_fallback(fault::not_found)
        .fallback(fault::not_found)
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(CatchPanicLayer::custom(fault::panic_response))
        .layer(middleware::from_fn_with_state(config.mode, fault::error_stage))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http()))
}

/// Credentialed CORS restricted to `origins`, GET/POST/PUT/DELETE, and the
/// Content-Type and Authorization headers.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring unusable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use proptest::prelude::*;

    struct Fixed(&'static [&'static str]);

    impl Resource for Fixed {
        fn routes(&self) -> Routes {
            self.0.iter().fold(Routes::new(), |routes, path| {
                routes.route(*path, get(|| async { "ok" }))
            })
        }
    }

    struct Echo;

    impl Resource for Echo {
        fn routes(&self) -> Routes {
            Routes::new().route(
                "/:id",
                get(|Path(id): Path<String>| async move { (StatusCode::OK, id) }),
            )
        }
    }

    #[test]
    fn routes_record_paths_once() {
        let routes: Routes = Routes::new()
            .route("/", get(|| async { "list" }))
            .route("/:id", get(|| async { "get" }))
            .route("/", axum::routing::post(|| async { "create" }));
        assert_eq!(routes.paths(), &["/", "/:id"]);
    }

    #[test]
    fn disjoint_siblings_do_not_shadow() {
        let table = RouteTable::new()
            .mount("/api/v1/patient", "patients", &Fixed(&["/", "/:id"]))
            .mount("/api/v1/meal", "meal", &Fixed(&["/", "/:id"]));
        assert!(table.shadowing().is_empty());
        assert!(table.validate().is_ok());
    }

    #[test]
    fn legacy_mount_with_named_routes_does_not_shadow() {
        let table = RouteTable::new()
            .mount_unlisted("/api/v1", &Fixed(&["/users", "/users/:id"]))
            .mount("/api/v1/user", "users", &Fixed(&["/users", "/users/:id"]))
            .mount("/api/v1/auth", "auth", &Fixed(&["/login"]));
        assert!(table.shadowing().is_empty());
    }

    #[test]
    fn parameter_route_on_shorter_prefix_shadows() {
        let table = RouteTable::new()
            .mount_unlisted("/api/v1", &Echo)
            .mount("/api/v1/patient", "patients", &Fixed(&["/"]));
        assert_eq!(
            table.shadowing(),
            vec![Shadowing {
                outer: "/api/v1".to_string(),
                path: "/:id".to_string(),
                inner: "/api/v1/patient".to_string(),
            }]
        );
        assert!(matches!(
            table.validate(),
            Err(RouteTableError::Shadowed(_))
        ));
    }

    #[test]
    fn static_route_matching_inner_segment_shadows() {
        let table = RouteTable::new()
            .mount_unlisted("/api/v1", &Fixed(&["/meal/today"]))
            .mount("/api/v1/meal", "meal", &Fixed(&["/"]));
        assert_eq!(table.shadowing().len(), 1);
    }

    #[test]
    fn segment_prefix_is_not_path_prefix() {
        // "/api/v1/user" must not be treated as nested inside "/api/v1/use"
        let table = RouteTable::new()
            .mount("/api/v1/use", "use", &Fixed(&["/:id"]))
            .mount("/api/v1/user", "users", &Fixed(&["/"]));
        assert!(table.shadowing().is_empty());
    }

    #[test]
    fn same_prefix_same_path_shadows() {
        let table = RouteTable::new()
            .mount("/api/v1/a", "a", &Fixed(&["/x"]))
            .mount_unlisted("/api/v1/a", &Fixed(&["/x", "/y"]));
        assert_eq!(table.shadowing().len(), 1);
    }

    #[test]
    fn invalid_prefixes_are_rejected() {
        for prefix in ["", "/", "api", "/api/", "/api//v1", "/api/:id", "/*rest"] {
            let table = RouteTable::new().mount(prefix, "x", &Fixed(&["/"]));
            assert_eq!(
                table.validate(),
                Err(RouteTableError::InvalidPrefix(prefix.to_string())),
                "prefix {:?}",
                prefix
            );
        }
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let table = RouteTable::new()
            .mount("/a", "same", &Fixed(&["/"]))
            .mount("/b", "same", &Fixed(&["/"]));
        assert_eq!(
            table.validate(),
            Err(RouteTableError::DuplicateKey("same".to_string()))
        );
    }

    #[test]
    fn entry_points_join_prefix_and_path() {
        let table = RouteTable::new()
            .mount("/api/v1/meal", "meal", &Fixed(&["/", "/:id"]))
            .mount_unlisted("/api/v1", &Fixed(&["/users"]));
        assert_eq!(
            table.entry_points(),
            vec!["/", "/api/v1/meal", "/api/v1/meal/:id", "/api/v1/users"]
        );
    }

    #[test]
    fn root_document_keeps_table_order() {
        let table = RouteTable::new()
            .mount("/api/v1/zeta", "zeta", &Fixed(&["/"]))
            .mount("/api/v1/alpha", "alpha", &Fixed(&["/"]))
            .mount_unlisted("/api/v1", &Fixed(&["/users"]));
        let text = serde_json::to_string(&RootDocument::describe(&table)).unwrap();
        assert_eq!(
            text,
            r#"{"status":"success","message":"LIFEEC API is running","endpoints":{"zeta":"/api/v1/zeta","alpha":"/api/v1/alpha"}}"#
        );
    }

    #[test]
    fn compose_refuses_shadowed_table() {
        let table = RouteTable::new()
            .mount_unlisted("/api/v1", &Echo)
            .mount("/api/v1/patient", "patients", &Fixed(&["/"]));
        assert!(compose(table, &Config::default()).is_err());
    }

    proptest! {
        #[test]
        fn root_document_lists_exactly_the_advertised_mounts(
            names in proptest::collection::btree_set("[a-z]{1,8}", 0..8)
        ) {
            let table = names.iter().fold(RouteTable::new(), |table, name| {
                table.mount(format!("/api/v1/{}", name), name.clone(), &Fixed(&["/"]))
            });
            let document = serde_json::to_value(RootDocument::describe(&table)).unwrap();
            let endpoints = document["endpoints"].as_object().unwrap();
            prop_assert_eq!(endpoints.len(), names.len());
            for mount in table.mounts() {
                let key = mount.key().unwrap();
                prop_assert_eq!(endpoints[key].as_str(), Some(mount.prefix()));
            }
            prop_assert!(table.validate().is_ok());
        }

        #[test]
        fn sibling_mounts_never_shadow(
            names in proptest::collection::btree_set("[a-z]{1,8}", 0..8)
        ) {
            let table = names.iter().fold(RouteTable::new(), |table, name| {
                table.mount(format!("/api/v1/{}", name), name.clone(), &Echo)
            });
            prop_assert!(table.shadowing().is_empty());
        }
    }
}
