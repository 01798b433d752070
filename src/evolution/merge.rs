// Content Merge Strategies
//
// Consolidation turns the distinct contents of a group into one text. The
// strategy is pluggable; any `Fn(&[String]) -> String` works.

/// Combines the distinct contents of a consolidation group
///
/// `contents` is non-empty, deduplicated and ordered primary first.
pub trait ContentMerger: Send + Sync {
    fn merge(&self, contents: &[String]) -> String;
}

/// Joins contents with newlines; a single content is kept unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NewlineJoinMerger;

impl ContentMerger for NewlineJoinMerger {
    fn merge(&self, contents: &[String]) -> String {
        contents.join("\n")
    }
}

impl<F> ContentMerger for F
where
    F: Fn(&[String]) -> String + Send + Sync,
{
    fn merge(&self, contents: &[String]) -> String {
        self(contents)
    }
}

/// Deduplicate contents keeping first-seen order
pub fn distinct_contents<'a, I>(contents: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut distinct: Vec<String> = Vec::new();
    for content in contents {
        if !distinct.iter().any(|c| c == content) {
            distinct.push(content.to_string());
        }
    }
    distinct
}
