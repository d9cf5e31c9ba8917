//! Network match patterns for analytics endpoints

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Beacon;
use crate::{Error, Result};

/// URL glob identifying analytics collection requests.
///
/// `**` matches any run of characters, `*` any run without `/`, and `?` a
/// single character other than `/`. The glob must match the whole URL.
#[derive(Debug, Clone)]
pub struct NetworkPattern {
    glob: String,
    method: Option<String>,
    regex: Regex,
}

impl NetworkPattern {
    pub fn new(glob: &str, method: Option<&str>) -> Result<Self> {
        if glob.trim().is_empty() {
            return Err(Error::InvalidPattern {
                pattern: glob.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }
        let source = glob_to_regex(glob);
        let regex = Regex::new(&source).map_err(|e| Error::InvalidPattern {
            pattern: glob.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            glob: glob.to_string(),
            method: method
                .map(str::trim)
                .filter(|m| !m.is_empty() && *m != "*")
                .map(str::to_ascii_uppercase),
            regex,
        })
    }

    pub fn glob(&self) -> &str {
        &self.glob
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Anchored regular expression equivalent to the glob
    pub fn regex_source(&self) -> &str {
        self.regex.as_str()
    }

    pub fn matches_url(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    pub fn matches(&self, method: &str, url: &str) -> bool {
        let method_ok = match &self.method {
            Some(expected) => expected.eq_ignore_ascii_case(method),
            None => true,
        };
        method_ok && self.matches_url(url)
    }

    pub fn matches_beacon(&self, beacon: &Beacon) -> bool {
        self.matches(&beacon.method, &beacon.raw_url)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    let mut literal = String::new();

    while let Some(c) = chars.next() {
        match c {
            '*' | '?' => {
                if !literal.is_empty() {
                    out.push_str(&regex::escape(&literal));
                    literal.clear();
                }
                if c == '?' {
                    out.push_str("[^/]");
                } else if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        out.push_str(&regex::escape(&literal));
    }
    out.push('$');
    out
}

/// Query parameters a beacon must carry to qualify, e.g. an action marker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequiredParams(pub Vec<String>);

impl RequiredParams {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn accepts(&self, beacon: &Beacon) -> bool {
        self.0.iter().all(|name| beacon.has_param(name))
    }
}
