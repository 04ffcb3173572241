//! Routes an incoming gRPC call to a destination (a record or mock engine)
//! by matching the fully-qualified `/package.Service/Method` against
//! per-route service/method regexes.

use regex::Regex;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("no route matched and no default route is configured")]
    Unimplemented,
}

/// One registered gRPC route. `destination` is opaque to the router: it's
/// whatever the caller wants dispatched to (an engine handle, a channel, etc).
pub struct GrpcRoute<D> {
    pub name: String,
    pub service_pattern: Option<Regex>,
    pub method_pattern: Option<Regex>,
    pub is_default: bool,
    pub destination: D,
}

impl<D> GrpcRoute<D> {
    fn matches(&self, service: &str, method: &str) -> bool {
        let service_ok = self.service_pattern.as_ref().map(|re| re.is_match(service)).unwrap_or(true);
        let method_ok = self.method_pattern.as_ref().map(|re| re.is_match(method)).unwrap_or(true);
        service_ok && method_ok
    }
}

#[derive(Default)]
pub struct GrpcRouter<D> {
    routes: Vec<GrpcRoute<D>>,
}

impl<D> GrpcRouter<D> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registration order matters: among non-default routes, the first
    /// whose patterns all match wins.
    pub fn register(&mut self, route: GrpcRoute<D>) {
        if route.service_pattern.is_none() && route.method_pattern.is_none() && !route.is_default {
            warn!(route = %route.name, "route has no patterns and is not marked default; it will match everything");
        }
        self.routes.push(route);
    }

    /// Split `/package.Service/Method` into `(service, method)`.
    pub fn parse_full_method(full_method: &str) -> Option<(&str, &str)> {
        let trimmed = full_method.strip_prefix('/').unwrap_or(full_method);
        trimmed.rsplit_once('/')
    }

    /// Route an incoming call. Picks the first non-default route whose set
    /// patterns all match; falls back to the default route; else
    /// `Unimplemented`.
    pub fn route(&self, full_method: &str) -> Result<&D, RouterError> {
        let (service, method) = Self::parse_full_method(full_method).unwrap_or(("", full_method));

        for route in self.routes.iter().filter(|r| !r.is_default) {
            if route.matches(service, method) {
                return Ok(&route.destination);
            }
        }

        self.routes
            .iter()
            .find(|r| r.is_default)
            .map(|r| &r.destination)
            .ok_or(RouterError::Unimplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str, service: Option<&str>, method: Option<&str>, is_default: bool, dest: i32) -> GrpcRoute<i32> {
        GrpcRoute {
            name: name.to_string(),
            service_pattern: service.map(|s| Regex::new(s).unwrap()),
            method_pattern: method.map(|m| Regex::new(m).unwrap()),
            is_default,
            destination: dest,
        }
    }

    #[test]
    fn parses_full_method_into_service_and_method() {
        let (service, method) = GrpcRouter::<i32>::parse_full_method("/pkg.MyService/DoThing").unwrap();
        assert_eq!(service, "pkg.MyService");
        assert_eq!(method, "DoThing");
    }

    #[test]
    fn first_matching_non_default_route_wins() {
        let mut router = GrpcRouter::new();
        router.register(route("a", Some("pkg.A"), None, false, 1));
        router.register(route("b", Some("pkg.B"), None, false, 2));

        assert_eq!(*router.route("/pkg.B/Method").unwrap(), 2);
    }

    #[test]
    fn falls_back_to_default_when_nothing_matches() {
        let mut router = GrpcRouter::new();
        router.register(route("a", Some("pkg.A"), None, false, 1));
        router.register(route("default", None, None, true, 99));

        assert_eq!(*router.route("/pkg.Unknown/Method").unwrap(), 99);
    }

    #[test]
    fn returns_unimplemented_with_no_match_and_no_default() {
        let mut router = GrpcRouter::new();
        router.register(route("a", Some("pkg.A"), None, false, 1));

        assert_eq!(router.route("/pkg.Unknown/Method").unwrap_err(), RouterError::Unimplemented);
    }

    #[test]
    fn route_with_no_patterns_matches_everything() {
        let mut router = GrpcRouter::new();
        router.register(route("catch-all", None, None, false, 7));

        assert_eq!(*router.route("/anything.At.All/Method").unwrap(), 7);
    }

    #[test]
    fn both_service_and_method_patterns_must_match() {
        let mut router = GrpcRouter::new();
        router.register(route("a", Some("pkg.A"), Some("^Get"), false, 1));
        router.register(route("default", None, None, true, 99));

        // service matches but method doesn't -> falls through to default
        assert_eq!(*router.route("/pkg.A/Delete").unwrap(), 99);
    }
}
