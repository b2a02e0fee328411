//! Pure path algebra over segment sequences. Nothing in here touches a backend, every function
//! is a plain transformation of [`Segments`].

mod segments;

pub use segments::Segments;

pub const SEPARATOR: char = '/';

/// Marks a sequence as anchored at the root when it is the first segment.
pub const ROOT_SENTINEL: &str = "";

const CURRENT_DIRECTORY: &str = ".";
const PARENT_DIRECTORY: &str = "..";

/// Splits a separator joined path into its segments. A leading separator becomes the root
/// sentinel and a single trailing separator is dropped. The empty string has no segments at all
/// and resolves to wherever it gets resolved against, it is not the root.
pub fn split(path: &str) -> Segments {
    if path.is_empty() {
        return Segments::default();
    }

    let mut segments: Vec<String> = path.split(SEPARATOR).map(String::from).collect();

    // "/" splits into two sentinels, only the leading one carries meaning
    if segments.len() > 1 && segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }

    Segments::from(segments)
}

/// Renders segments back into a separator joined string. The lone root sentinel renders as a
/// single separator.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    match segments {
        [only] if only.as_ref() == ROOT_SENTINEL => SEPARATOR.to_string(),
        _ => {
            let parts: Vec<&str> = segments.iter().map(|s| s.as_ref()).collect();
            parts.join(&SEPARATOR.to_string())
        }
    }
}

/// Collapses `.`, `..`, and empty segments in a single left to right pass.
///
/// Absolute sequences clamp at the root. Relative sequences either accumulate leading `..`
/// segments (`allow_upstream`) or, when an escape above the starting point is not permitted,
/// yield an empty sequence. Use [`try_normalize`] to get that case as an error instead.
pub fn normalize<S: AsRef<str>>(segments: &[S], allow_upstream: bool) -> Segments {
    normalize_inner(segments, allow_upstream).unwrap_or_default()
}

/// Normalizes a sequence without permitting upstream traversal, reporting an escape above the
/// starting point as [`PathError::InvalidTraversal`] rather than an empty result.
pub fn try_normalize<S: AsRef<str>>(segments: &[S]) -> Result<Segments, PathError> {
    normalize_inner(segments, false).ok_or_else(|| PathError::InvalidTraversal(join(segments)))
}

fn normalize_inner<S: AsRef<str>>(segments: &[S], allow_upstream: bool) -> Option<Segments> {
    let (absolute, remaining) = match segments.split_first() {
        Some((first, rest)) if first.as_ref() == ROOT_SENTINEL => (true, rest),
        _ => (false, segments),
    };

    let mut stack: Vec<String> = Vec::with_capacity(segments.len());
    if absolute {
        stack.push(ROOT_SENTINEL.to_string());
    }

    // Named segments pushed during this pass, anything below them is a run of leading ".."
    let mut named = 0usize;

    for segment in remaining {
        let segment: &str = segment.as_ref();

        match segment {
            ROOT_SENTINEL | CURRENT_DIRECTORY => continue,
            PARENT_DIRECTORY if absolute => {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
            PARENT_DIRECTORY if allow_upstream => {
                if named > 0 {
                    stack.pop();
                    named -= 1;
                } else {
                    stack.push(PARENT_DIRECTORY.to_string());
                }
            }
            PARENT_DIRECTORY => {
                stack.pop()?;
            }
            name => {
                stack.push(name.to_string());
                named += 1;
            }
        }
    }

    Some(Segments::from(stack))
}

/// Folds the provided sequences from last to first, prepending earlier ones until an absolute
/// sequence has been reached, then normalizes the result with upstream traversal permitted. A
/// later absolute path wins over everything before it.
///
/// Never empty: when nothing survives normalization the result is `["."]`.
pub fn resolve<S: AsRef<[String]>>(sequences: &[S]) -> Segments {
    let mut combined: Vec<&str> = Vec::new();

    for sequence in sequences.iter().rev() {
        if matches!(combined.first(), Some(&first) if first == ROOT_SENTINEL) {
            break;
        }

        let sequence: &[String] = sequence.as_ref();
        let mut prefixed: Vec<&str> = Vec::with_capacity(sequence.len() + combined.len());
        prefixed.extend(sequence.iter().map(String::as_str));
        prefixed.extend(combined);
        combined = prefixed;
    }

    let normalized = normalize(&combined, true);
    if normalized.is_empty() {
        return Segments::current();
    }

    normalized
}

impl AsRef<[String]> for Segments {
    fn as_ref(&self) -> &[String] {
        self.as_slice()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path '{0}' traverses above its starting directory")]
    InvalidTraversal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(path: &str) -> Segments {
        split(path)
    }

    #[test]
    fn test_splitting() {
        assert!(split("").is_empty());
        assert_eq!(split("/").as_slice(), &[""]);
        assert_eq!(split("/a/b").as_slice(), &["", "a", "b"]);
        assert_eq!(split("/a/b/").as_slice(), &["", "a", "b"]);
        assert_eq!(split("a/b").as_slice(), &["a", "b"]);
        assert_eq!(split("a//b").as_slice(), &["a", "", "b"]);
        assert_eq!(split("../c").as_slice(), &["..", "c"]);
    }

    #[test]
    fn test_joining() {
        assert_eq!(join(&[""]), "/");
        assert_eq!(join::<&str>(&[]), "");
        assert_eq!(join(&["", "a", "b"]), "/a/b");
        assert_eq!(join(&["..", "a"]), "../a");
        assert_eq!(join(&["."]), ".");
        assert_eq!(seq("/projects").to_string(), "/projects");
    }

    #[test]
    fn test_normalize_escape_edge_cases() {
        assert!(normalize(&[".."], false).is_empty());
        assert_eq!(normalize(&[".."], true).as_slice(), &[".."]);

        let path = seq("./folder/../../../../file");
        assert!(normalize(&path, false).is_empty());
        assert_eq!(normalize(&path, true), seq("../../../file"));
    }

    #[test]
    fn test_normalize_absolute_clamps_at_root() {
        assert_eq!(normalize(&seq("/../../a"), false), seq("/a"));
        assert_eq!(normalize(&seq("/a/../.."), true), Segments::root());
        assert_eq!(normalize(&["", "", ".."], true), Segments::root());
    }

    #[test]
    fn test_normalize_discards_noise() {
        assert_eq!(normalize(&seq("/a/./b//c/"), false), seq("/a/b/c"));
        assert_eq!(normalize(&seq("a/./b/../c"), false), seq("a/c"));
        assert_eq!(normalize(&seq("../a/../../b"), true), seq("../../b"));
    }

    #[test]
    fn test_normalize_is_idempotent_for_absolute() {
        for path in ["/", "/a", "/a/b/c", "/a/..b/c.d", "/projects/dirnav/src/lib.rs"] {
            let normalized = normalize(&seq(path), true);
            assert!(normalized.is_absolute());
            assert_eq!(normalize(&normalized, true), normalized);
            assert_eq!(normalize(&normalized, false), normalized);
        }
    }

    #[test]
    fn test_normalize_is_idempotent_for_generated_absolute() {
        use rand::seq::SliceRandom;
        use rand::Rng;

        let pieces = ["", ".", "..", "a", "b", "c.d"];
        let mut rng = rand::thread_rng();

        for _ in 0..500 {
            let length = rng.gen_range(0..12);
            let mut generated = vec![ROOT_SENTINEL.to_string()];
            for _ in 0..length {
                if let Some(piece) = pieces.choose(&mut rng) {
                    generated.push(piece.to_string());
                }
            }

            let normalized = normalize(&generated, true);
            assert!(normalized.is_absolute(), "{generated:?} lost its root");
            assert!(
                normalized[1..]
                    .iter()
                    .all(|name| !matches!(name.as_str(), "" | "." | "..")),
                "{generated:?} normalized to {normalized:?}"
            );
            assert_eq!(normalize(&normalized, true), normalized);
            assert_eq!(normalize(&normalized, false), normalized);
            assert_eq!(normalize(&generated, false), normalized);
        }
    }

    #[test]
    fn test_try_normalize() {
        assert_eq!(try_normalize(&seq("a/b/..")).unwrap(), seq("a"));
        assert!(matches!(
            try_normalize(&seq("a/../..")),
            Err(PathError::InvalidTraversal(path)) if path == "a/../.."
        ));

        // Collapsing to nothing is fine, only escaping is not
        assert!(try_normalize(&seq("a/..")).unwrap().is_empty());
    }

    #[test]
    fn test_resolution() {
        assert_eq!(resolve(&[seq("/a/b"), seq("../c")]), seq("/a/c"));
        assert_eq!(resolve(&[seq("/"), seq("..")]).to_string(), "/");
        assert_eq!(
            resolve(&[Segments::from(["", ""]), Segments::from([".."])]).as_slice(),
            &[""]
        );
        assert_eq!(
            resolve(&[Segments::default(), Segments::default()]).as_slice(),
            &["."]
        );
        assert_eq!(resolve::<Segments>(&[]).as_slice(), &["."]);
    }

    #[test]
    fn test_resolution_later_absolute_wins() {
        assert_eq!(
            resolve(&[seq("/a"), seq("/b/c"), seq("d")]),
            seq("/b/c/d")
        );
        assert_eq!(resolve(&[seq("/a"), seq("b"), seq("/")]), Segments::root());
        assert_eq!(resolve(&[seq("a"), seq("b")]), seq("a/b"));
        assert_eq!(resolve(&[seq("a"), seq("../..")]), seq(".."));
    }
}
