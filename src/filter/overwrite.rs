use regex::Regex;
use std::borrow::Cow;

/// A configured rename rule: every match of `pattern` in a line is replaced
/// with `replacement`. `$1`-style group references are expanded.
#[derive(Debug, Clone)]
pub struct Overwrite {
    pattern: Regex,
    replacement: String,
}

impl Overwrite {
    /// Compile a rename rule.
    pub fn new(pattern: &str, replacement: &str) -> Result<Overwrite, ::regex::Error> {
        Ok(Overwrite {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }

    /// Whether the rule applies to `line`.
    pub fn is_match(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }

    /// Apply the rule to `line`.
    pub fn apply<'a>(&self, line: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(line, self.replacement.as_str())
    }
}

/// Apply the first rule of `rules` that matches `line`. Later rules are not
/// consulted, even if the rewritten line would match them.
pub fn overwrite<'a>(rules: &[Overwrite], line: &'a str) -> Cow<'a, str> {
    for rule in rules {
        if rule.is_match(line) {
            return rule.apply(line);
        }
    }
    Cow::Borrowed(line)
}
