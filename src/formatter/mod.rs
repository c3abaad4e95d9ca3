use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Datelike, SecondsFormat, Timelike, Utc};
use regex::Regex;
use tracing::trace;

use crate::config::LocationConfig;
use crate::types::FieldSet;
use crate::types::error::FormatterError;

const GZIP_SUFFIX: &str = ".gz";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A compiled key template such as `{collection}/{date}/{name}.{ext}`.
///
/// `{{` and `}}` stand for literal braces. A placeholder may appear more than
/// once; extraction then requires every occurrence to capture the same text.
#[derive(Debug, Clone)]
pub struct FormatTemplate {
    template: String,
    segments: Vec<Segment>,
    matcher: Regex,
}

impl FormatTemplate {
    pub fn compile(template: &str) -> Result<Self, FormatterError> {
        let segments = parse_segments(template)?;
        let matcher = build_matcher(&segments).map_err(|e| FormatterError::Template {
            template: template.to_string(),
            reason: e.to_string(),
        })?;

        Ok(FormatTemplate {
            template: template.to_string(),
            segments,
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn extract(&self, key: &str) -> Result<FieldSet, FormatterError> {
        let no_match = || FormatterError::NoMatch {
            key: key.to_string(),
            template: self.template.clone(),
        };

        let captures = self.matcher.captures(key).ok_or_else(no_match)?;

        let mut fields = FieldSet::new();
        for (index, name) in self.placeholders().enumerate() {
            let value = captures
                .get(index + 1)
                .map(|m| m.as_str())
                .ok_or_else(no_match)?;

            match fields.get(name) {
                Some(previous) if previous != value => return Err(no_match()),
                Some(_) => {}
                None => {
                    fields.insert(name.to_string(), value.to_string());
                }
            }
        }

        Ok(fields)
    }

    pub fn render(&self, fields: &FieldSet) -> Result<String, FormatterError> {
        let mut key = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => key.push_str(literal),
                Segment::Placeholder(name) => {
                    let value = fields.get(name).ok_or_else(|| FormatterError::MissingField {
                        field: name.clone(),
                        template: self.template.clone(),
                    })?;
                    key.push_str(value);
                }
            }
        }

        Ok(key)
    }
}

impl PartialEq for FormatTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

impl Eq for FormatTemplate {}

impl FromStr for FormatTemplate {
    type Err = FormatterError;

    fn from_str(template: &str) -> Result<Self, Self::Err> {
        FormatTemplate::compile(template)
    }
}

impl Display for FormatTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn parse_segments(template: &str) -> Result<Vec<Segment>, FormatterError> {
    let error = |reason: &str| FormatterError::Template {
        template: template.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) if c.is_ascii_alphanumeric() || c == '_' => name.push(c),
                        Some(_) => return Err(error("placeholder names may only contain [A-Za-z0-9_]")),
                        None => return Err(error("unclosed '{'")),
                    }
                }

                if name.is_empty() {
                    return Err(error("empty placeholder"));
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                } else if matches!(segments.last(), Some(Segment::Placeholder(_))) {
                    return Err(error(
                        "adjacent placeholders must be separated by a literal",
                    ));
                }

                segments.push(Segment::Placeholder(name));
            }
            '}' => return Err(error("unmatched '}'")),
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    if segments.is_empty() {
        return Err(error("empty template"));
    }

    Ok(segments)
}

fn build_matcher(segments: &[Segment]) -> Result<Regex, regex::Error> {
    let mut pattern = String::from("(?s)^");

    for (index, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Literal(literal) => pattern.push_str(&regex::escape(literal)),
            Segment::Placeholder(_) => {
                let capture = match segments.get(index + 1) {
                    Some(Segment::Literal(next)) if next.starts_with('/') => "([^/]*?)",
                    Some(Segment::Literal(next)) if next.starts_with('.') => "([^.]*?)",
                    Some(_) => "(.*?)",
                    None => "(.*)",
                };
                pattern.push_str(capture);
            }
        }
    }
    pattern.push('$');

    trace!(pattern = pattern, "template matcher compiled.");

    Regex::new(&pattern)
}

/// Fields available to every destination template of one run.
pub fn run_fields(now: DateTime<Utc>) -> FieldSet {
    [
        ("date", now.format("%Y-%m-%d").to_string()),
        ("datetime", now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("year", format!("{:04}", now.year())),
        ("month", format!("{:02}", now.month())),
        ("day", format!("{:02}", now.day())),
        ("hour", format!("{:02}", now.hour())),
        ("minute", format!("{:02}", now.minute())),
        ("second", format!("{:02}", now.second())),
        ("weekday", now.weekday().num_days_from_monday().to_string()),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
}

pub fn is_gzip_key(key: &str) -> bool {
    key.ends_with(GZIP_SUFFIX)
}

/// Removes one trailing `.gz`, matching the single decompression pass of the copier.
pub fn strip_unpack_suffix(key: &str) -> &str {
    match key.strip_suffix(GZIP_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => key,
    }
}

/// Maps source relpaths to destination keys for one run.
#[derive(Debug, Clone)]
pub struct KeyFormatter {
    source_template: Option<FormatTemplate>,
    run_fields: FieldSet,
}

impl KeyFormatter {
    pub fn new(source_template: Option<FormatTemplate>, now: DateTime<Utc>) -> Self {
        KeyFormatter {
            source_template,
            run_fields: run_fields(now),
        }
    }

    pub fn destination_key(
        &self,
        relpath: &str,
        destination: &LocationConfig,
    ) -> Result<String, FormatterError> {
        let key = match (&self.source_template, &destination.formatter) {
            (Some(source_template), Some(destination_template)) => {
                let mut fields = self.run_fields.clone();
                fields.extend(source_template.extract(relpath)?);
                destination_template.render(&fields)?
            }
            _ => relpath.to_string(),
        };

        let key = if destination.unpack {
            strip_unpack_suffix(&key).to_string()
        } else {
            key
        };

        if key.is_empty() {
            return Err(FormatterError::EmptyKey {
                relpath: relpath.to_string(),
            });
        }

        Ok(key)
    }
}
