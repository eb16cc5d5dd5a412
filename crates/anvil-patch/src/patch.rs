//! Patch parsing, application and generation

use crate::hunk::{Hunk, HunkLine};
use crate::split_lines;
use similar::{ChangeTag, TextDiff};
use std::fmt::{self, Display, Formatter};

/// Number of context lines emitted around changes by [`Patch::between`].
const CONTEXT_LINES: usize = 3;

/// Errors raised while parsing or applying a patch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    /// A `@@` line that does not follow `@@ -X,Y +A,B @@`.
    #[error("malformed hunk header: {0:?}")]
    MalformedHeader(String),

    /// A body line with no `+`/`-`/space prefix.
    #[error("malformed hunk line: {0:?}")]
    MalformedLine(String),

    /// Hunks out of ascending order or covering overlapping line ranges.
    #[error("hunk starting at original line {orig_start} overlaps the previous hunk")]
    OverlappingHunks {
        /// `orig_start` of the offending hunk.
        orig_start: usize,
    },

    /// Hunk body line counts disagree with the header.
    #[error("hunk starting at original line {orig_start} disagrees with its header counts")]
    CountMismatch {
        /// `orig_start` of the offending hunk.
        orig_start: usize,
    },

    /// A context or removal line did not match the baseline.
    ///
    /// `found` is `None` when the baseline ended before the stated offset.
    #[error("context mismatch at baseline line {line}: expected {expected:?}, found {found:?}")]
    ContextMismatch {
        /// 1-based baseline line number of the mismatch.
        line: usize,
        /// Line text the patch expected at that offset.
        expected: String,
        /// Line text actually present, if any.
        found: Option<String>,
    },
}

/// A headerless unified diff: an ordered set of non-overlapping [`Hunk`]s.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Patch {
    hunks: Vec<Hunk>,
}

impl Patch {
    /// Hunks in ascending `orig_start` order.
    #[must_use]
    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Parse the wire form.
    ///
    /// Hunks must be ascending and non-overlapping, and each body must match
    /// its header counts exactly; violations are parse errors, not apply
    /// errors. `\`-prefixed marker lines are ignored. An empty body line is
    /// accepted as blank context (producers commonly drop the leading space).
    ///
    /// # Errors
    /// See [`PatchError`] for the parse-time variants.
    pub fn parse(text: &str) -> Result<Self, PatchError> {
        let mut hunks: Vec<Hunk> = Vec::new();
        let mut current: Option<Hunk> = None;

        for raw in text.split('\n') {
            if raw.starts_with("@@") {
                if let Some(done) = current.take() {
                    finalize_hunk(done, &mut hunks)?;
                }
                current = Some(parse_header(raw)?);
                continue;
            }

            let Some(hunk) = current.as_mut() else {
                if raw.is_empty() {
                    continue;
                }
                return Err(PatchError::MalformedLine(raw.to_string()));
            };

            let body_complete = hunk.baseline_lines() >= hunk.orig_len
                && hunk.output_lines() >= hunk.new_len;

            if let Some(rest) = raw.strip_prefix('+') {
                hunk.lines.push(HunkLine::Add(rest.to_string()));
            } else if let Some(rest) = raw.strip_prefix('-') {
                hunk.lines.push(HunkLine::Remove(rest.to_string()));
            } else if let Some(rest) = raw.strip_prefix(' ') {
                hunk.lines.push(HunkLine::Context(rest.to_string()));
            } else if raw.starts_with('\\') {
                // "\ No newline at end of file" and friends
                continue;
            } else if raw.is_empty() {
                if !body_complete {
                    hunk.lines.push(HunkLine::Context(String::new()));
                }
                // ignored between hunks
            } else {
                return Err(PatchError::MalformedLine(raw.to_string()));
            }
        }

        if let Some(done) = current.take() {
            finalize_hunk(done, &mut hunks)?;
        }

        Ok(Self { hunks })
    }

    /// Apply the patch to a baseline, producing the patched text.
    ///
    /// # Errors
    /// [`PatchError::ContextMismatch`] when a context or removal line does
    /// not equal the baseline at the stated offset; the baseline is never
    /// partially written.
    pub fn apply(&self, baseline: &str) -> Result<String, PatchError> {
        let lines = split_lines(baseline);
        let mut out: Vec<&str> = Vec::with_capacity(lines.len());
        let mut cursor = 0usize;

        for hunk in &self.hunks {
            // A zero-length hunk inserts after line `orig_start`.
            let start = if hunk.orig_len == 0 {
                hunk.orig_start
            } else {
                hunk.orig_start - 1
            };
            if start < cursor || start > lines.len() {
                let expected = hunk
                    .lines
                    .iter()
                    .find(|l| l.reads_baseline())
                    .map(|l| l.text().to_string())
                    .unwrap_or_default();
                return Err(PatchError::ContextMismatch {
                    line: hunk.orig_start,
                    expected,
                    found: None,
                });
            }
            out.extend_from_slice(&lines[cursor..start]);
            cursor = start;

            for line in &hunk.lines {
                match line {
                    HunkLine::Add(text) => out.push(text),
                    HunkLine::Context(expected) | HunkLine::Remove(expected) => {
                        match lines.get(cursor) {
                            Some(found) if *found == expected.as_str() => {}
                            found => {
                                return Err(PatchError::ContextMismatch {
                                    line: cursor + 1,
                                    expected: expected.clone(),
                                    found: found.map(|s| (*s).to_string()),
                                });
                            }
                        }
                        if matches!(line, HunkLine::Context(_)) {
                            out.push(lines[cursor]);
                        }
                        cursor += 1;
                    }
                }
            }
        }

        out.extend_from_slice(&lines[cursor..]);
        Ok(out.join("\n"))
    }

    /// Compute the patch turning `old` into `new`.
    ///
    /// Guarantees `Patch::between(old, new).apply(old) == new` for any pair
    /// of texts. Identical texts yield an empty patch.
    #[must_use]
    pub fn between(old: &str, new: &str) -> Self {
        let old_lines = split_lines(old);
        let new_lines = split_lines(new);
        let diff = TextDiff::from_slices(&old_lines, &new_lines);

        let mut hunks = Vec::new();
        for group in diff.grouped_ops(CONTEXT_LINES) {
            let Some(first) = group.first() else { continue };
            let last = group.last().unwrap_or(first);

            let old_range = first.old_range().start..last.old_range().end;
            let new_range = first.new_range().start..last.new_range().end;
            let orig_len = old_range.len();
            let new_len = new_range.len();

            let mut lines = Vec::new();
            for op in &group {
                for change in diff.iter_changes(op) {
                    let text = (*change.value()).to_string();
                    lines.push(match change.tag() {
                        ChangeTag::Equal => HunkLine::Context(text),
                        ChangeTag::Delete => HunkLine::Remove(text),
                        ChangeTag::Insert => HunkLine::Add(text),
                    });
                }
            }

            hunks.push(Hunk {
                orig_start: if orig_len == 0 {
                    old_range.start
                } else {
                    old_range.start + 1
                },
                orig_len,
                new_start: if new_len == 0 {
                    new_range.start
                } else {
                    new_range.start + 1
                },
                new_len,
                lines,
            });
        }

        Self { hunks }
    }
}

impl Display for Patch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, hunk) in self.hunks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{hunk}")?;
        }
        Ok(())
    }
}

/// Which encoding of a file update the producer should emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    /// Full replacement body.
    Full(String),
    /// Diff against the baseline.
    Diff(Patch),
}

impl Representation {
    /// Pick the byte-smaller of the full target body and its diff encoding.
    ///
    /// Advisory producer-side policy; consumers must accept either form.
    #[must_use]
    pub fn choose(baseline: &str, target: &str) -> Self {
        let patch = Patch::between(baseline, target);
        let rendered = patch.to_string();
        // Full wins only when the diff encoding exceeds the target body.
        if rendered.len() <= target.len() {
            Representation::Diff(patch)
        } else {
            Representation::Full(target.to_string())
        }
    }
}

fn parse_header(raw: &str) -> Result<Hunk, PatchError> {
    let malformed = || PatchError::MalformedHeader(raw.to_string());

    let inner = raw
        .strip_prefix("@@ -")
        .and_then(|rest| rest.split_once(" @@"))
        .map(|(ranges, _)| ranges)
        .ok_or_else(malformed)?;
    let (orig, new) = inner.split_once(" +").ok_or_else(malformed)?;

    let (orig_start, orig_len) = parse_range(orig).ok_or_else(malformed)?;
    let (new_start, new_len) = parse_range(new).ok_or_else(malformed)?;
    if orig_len > 0 && orig_start == 0 {
        return Err(malformed());
    }

    Ok(Hunk {
        orig_start,
        orig_len,
        new_start,
        new_len,
        lines: Vec::new(),
    })
}

/// Parse `start,len`; a bare `start` means a length of one, per GNU diff.
fn parse_range(raw: &str) -> Option<(usize, usize)> {
    match raw.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((raw.parse().ok()?, 1)),
    }
}

fn finalize_hunk(hunk: Hunk, hunks: &mut Vec<Hunk>) -> Result<(), PatchError> {
    if hunk.baseline_lines() != hunk.orig_len || hunk.output_lines() != hunk.new_len {
        return Err(PatchError::CountMismatch {
            orig_start: hunk.orig_start,
        });
    }
    if let Some(prev) = hunks.last() {
        // A zero-length hunk occupies the gap after its start line, so the
        // next hunk must begin strictly later.
        let overlaps = if prev.orig_len == 0 {
            hunk.orig_start <= prev.orig_start
        } else {
            hunk.orig_start < prev.orig_end()
        };
        if overlaps {
            return Err(PatchError::OverlappingHunks {
                orig_start: hunk.orig_start,
            });
        }
    }
    hunks.push(hunk);
    Ok(())
}
