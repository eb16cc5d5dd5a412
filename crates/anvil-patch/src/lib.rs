//! Headerless unified-diff reconciliation
//!
//! Upstream generators describe partial file edits as GNU unified-diff hunks
//! with the file-header lines omitted. This crate parses that wire form into
//! a [`Patch`], applies it to a baseline string with exact context matching,
//! and produces patches from two texts so the producer can pick the smaller
//! of `{full content, diff encoding}` via [`Representation::choose`].
//!
//! Application is strict: a context or removal line that does not match the
//! baseline at the stated offset is a [`PatchError::ContextMismatch`], never
//! silently patched around.

mod hunk;
mod patch;

pub use hunk::{Hunk, HunkLine};
pub use patch::{Patch, PatchError, Representation};

/// Split a text into its line model: segments between `'\n'` separators.
///
/// A trailing newline yields a trailing empty segment, which makes
/// `split_lines(s).join("\n") == s` hold for every input. All patch offsets
/// refer to this model.
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

#[cfg(test)]
mod tests {
    use super::split_lines;

    #[test]
    fn split_round_trips_trailing_newline() {
        for text in ["", "\n", "a", "a\n", "a\nb", "a\nb\n", "\n\n"] {
            assert_eq!(split_lines(text).join("\n"), text);
        }
    }
}
