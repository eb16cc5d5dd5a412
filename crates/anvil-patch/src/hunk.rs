//! Hunk model for headerless unified diffs

use std::fmt::{self, Display, Formatter};

/// One line inside a hunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    /// Unchanged line, must match the baseline exactly.
    Context(String),
    /// Line added by the patch.
    Add(String),
    /// Line removed from the baseline, must match exactly.
    Remove(String),
}

impl HunkLine {
    /// Line text without the diff prefix.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            HunkLine::Context(s) | HunkLine::Add(s) | HunkLine::Remove(s) => s,
        }
    }

    /// Whether this line consumes a baseline line.
    #[must_use]
    pub fn reads_baseline(&self) -> bool {
        matches!(self, HunkLine::Context(_) | HunkLine::Remove(_))
    }

    /// Whether this line appears in the patched output.
    #[must_use]
    pub fn emits_output(&self) -> bool {
        matches!(self, HunkLine::Context(_) | HunkLine::Add(_))
    }
}

impl Display for HunkLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HunkLine::Context(s) => write!(f, " {s}"),
            HunkLine::Add(s) => write!(f, "+{s}"),
            HunkLine::Remove(s) => write!(f, "-{s}"),
        }
    }
}

/// One changed section: `@@ -orig_start,orig_len +new_start,new_len @@`
/// plus its body lines. Starts are 1-based line numbers; a length of zero
/// addresses the gap before `start + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based first line of the hunk in the original text.
    pub orig_start: usize,
    /// Number of original lines covered (context + removals).
    pub orig_len: usize,
    /// 1-based first line of the hunk in the modified text.
    pub new_start: usize,
    /// Number of modified lines covered (context + additions).
    pub new_len: usize,
    /// Body in wire order.
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Count of body lines that consume baseline lines.
    #[must_use]
    pub fn baseline_lines(&self) -> usize {
        self.lines.iter().filter(|l| l.reads_baseline()).count()
    }

    /// Count of body lines that appear in the output.
    #[must_use]
    pub fn output_lines(&self) -> usize {
        self.lines.iter().filter(|l| l.emits_output()).count()
    }

    /// Exclusive end of the original-line range this hunk touches.
    #[must_use]
    pub fn orig_end(&self) -> usize {
        self.orig_start + self.orig_len
    }
}

impl Display for Hunk {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "@@ -{},{} +{},{} @@",
            self.orig_start, self.orig_len, self.new_start, self.new_len
        )?;
        for (i, line) in self.lines.iter().enumerate() {
            if i + 1 == self.lines.len() {
                write!(f, "{line}")?;
            } else {
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_accounting() {
        let hunk = Hunk {
            orig_start: 1,
            orig_len: 2,
            new_start: 1,
            new_len: 2,
            lines: vec![
                HunkLine::Context("a".into()),
                HunkLine::Remove("b".into()),
                HunkLine::Add("c".into()),
            ],
        };
        assert_eq!(hunk.baseline_lines(), 2);
        assert_eq!(hunk.output_lines(), 2);
        assert_eq!(hunk.orig_end(), 3);
    }

    #[test]
    fn display_prefixes() {
        assert_eq!(HunkLine::Context("x".into()).to_string(), " x");
        assert_eq!(HunkLine::Add("x".into()).to_string(), "+x");
        assert_eq!(HunkLine::Remove("x".into()).to_string(), "-x");
    }
}
