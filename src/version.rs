//! Various helper method for reporting on the compiled version of the library, useful when
//! logging from applications embedding the navigator.

/// Reports the full version and various useful build settings as a well-formatted and
/// semi-structured string.
pub fn full_version() -> String {
    format!(
        "build-profile={} build-timestamp={} features={} repo-version={}",
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_FEATURES"),
        env!("REPO_VERSION"),
    )
}

/// When size matters, but you want to report the version of the library, the returned string from
/// this function is the one for you. It contains only the absolute core version information from
/// the build.
pub fn minimal_version() -> String {
    format!("repo-version={}", env!("REPO_VERSION"))
}

pub fn version() -> String {
    full_version()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_reporting() {
        assert!(minimal_version().starts_with("repo-version="));
        assert!(full_version().contains(&minimal_version()));
    }
}
