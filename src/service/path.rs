//! Resolves a caller-supplied path into a routing group and a route within
//! it. The in-memory separator is always `/`; backends translate to their
//! own wire separator at the transport boundary.

/// Group + route extracted from a `Handle`/`On` path. `group` is either the
/// service's own name (bare or single-segment paths) or an explicit prefix
/// (multi-segment paths), in which case it is recorded in the service's
/// `prefixes` set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
    pub group: String,
    pub route: String,
}

pub fn resolve(path: &str, own_name: &str) -> ResolvedPath {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => ResolvedPath {
            group: own_name.to_string(),
            route: String::new(),
        },
        [only] => ResolvedPath {
            group: own_name.to_string(),
            route: (*only).to_string(),
        },
        [group, rest @ ..] => ResolvedPath {
            group: (*group).to_string(),
            route: rest.join("/"),
        },
    }
}

/// The canonical slash-joined wire route a backend further translates.
pub fn full_route(resolved: &ResolvedPath) -> String {
    format!("{}/{}", resolved.group, resolved.route)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_segment_resolves_under_own_name() {
        let r = resolve("x", "calc");
        assert_eq!(r, ResolvedPath { group: "calc".into(), route: "x".into() });
    }

    #[test]
    fn leading_slash_is_equivalent_to_bare() {
        assert_eq!(resolve("/x", "calc"), resolve("x", "calc"));
    }

    #[test]
    fn two_segments_use_the_first_as_the_group() {
        let r = resolve("math/sum", "calc");
        assert_eq!(r, ResolvedPath { group: "math".into(), route: "sum".into() });
    }

    #[test]
    fn more_than_two_segments_keep_the_remainder_joined_as_the_route() {
        let r = resolve("math/sum/extra", "calc");
        assert_eq!(r, ResolvedPath { group: "math".into(), route: "sum/extra".into() });
        assert_eq!(full_route(&r), "math/sum/extra");
    }
}
