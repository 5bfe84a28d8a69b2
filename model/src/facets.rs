use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use regex::Regex;
use tracing::warn;

use super::error::TableError;
use super::xstypes::QName;
use super::UnsupportedFacetAction;

/// Constraining facets of one derivation step, as written in the schema.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FacetSource {
    /// Values of the `<pattern>` children of one restriction
    pub patterns: Vec<String>,
    /// Values of the `<enumeration>` children of one restriction
    pub enumeration: Vec<String>,
    pub length: Option<String>,
    pub min_length: Option<String>,
    pub max_length: Option<String>,
    pub min_inclusive: Option<String>,
    pub min_exclusive: Option<String>,
    pub max_inclusive: Option<String>,
    pub max_exclusive: Option<String>,
}

impl FacetSource {
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
            && self.enumeration.is_empty()
            && self.length.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.min_inclusive.is_none()
            && self.min_exclusive.is_none()
            && self.max_inclusive.is_none()
            && self.max_exclusive.is_none()
    }
}

/// Schema Component: pattern, a kind of Constraining Facet (pt. 2, §4.3.4)
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// The pattern as declared; several `<pattern>` siblings are joined into one expression with
    /// multiple branches.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// Rewrites an XSD regular expression (pt. 2, Appendix G) into the syntax of the `regex` crate.
///
/// XSD has no anchors, so `^` and `$` are literals outside character classes, and `.` excludes
/// only line breaks. Character class subtraction `[a-z-[aeiou]]` becomes `[a-z--[aeiou]]`.
/// Escapes without a counterpart (such as `\i`) are passed through and rejected by the compiler.
fn translate_pattern(pattern: &str) -> String {
    fn push_escape(out: &mut String, chars: &mut Peekable<Chars>) {
        out.push('\\');
        if let Some(next) = chars.next() {
            out.push(next);
        }
    }

    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    let mut class_depth = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '\\' => push_escape(&mut out, &mut chars),
            '[' => {
                class_depth += 1;
                out.push('[');
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(']');
            }
            '-' if class_depth > 0 && chars.peek() == Some(&'[') => out.push_str("--"),
            '^' | '$' if class_depth == 0 => {
                out.push('\\');
                out.push(c);
            }
            '.' if class_depth == 0 => out.push_str(r"[^\n\r]"),
            _ => out.push(c),
        }
    }
    out
}

/// Schema Component: minInclusive/minExclusive/maxInclusive/maxExclusive (pt. 2, §4.3.7-4.3.10)
///
/// Bounds are compared numerically.
#[derive(Clone, Debug, PartialEq)]
pub struct Bound {
    literal: String,
    value: f64,
    inclusive: bool,
}

impl Bound {
    pub fn as_str(&self) -> &str {
        &self.literal
    }

    pub fn is_inclusive(&self) -> bool {
        self.inclusive
    }
}

/// Compiled facets of one derivation step.
#[derive(Clone, Debug, Default)]
pub struct Facets {
    pattern: Option<Pattern>,
    enumeration: Vec<String>,
    length: Option<usize>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min: Option<Bound>,
    max: Option<Bound>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FacetViolation {
    Pattern { pattern: String },
    Enumeration { allowed: Vec<String> },
    Length { expected: usize, actual: usize },
    MinLength { min: usize, actual: usize },
    MaxLength { max: usize, actual: usize },
    MinBound { bound: String, inclusive: bool },
    MaxBound { bound: String, inclusive: bool },
    /// A list item or union value outside the lexical space of a builtin type
    Lexical { value: String, builtin: String },
    /// A union value accepted by none of its member types
    MemberTypes,
}

impl fmt::Display for FacetViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern { pattern } => write!(f, "value does not match pattern {pattern:?}"),
            Self::Enumeration { allowed } => {
                write!(f, "value is not one of {}", allowed.join(", "))
            }
            Self::Length { expected, actual } => {
                write!(f, "length {actual} differs from required length {expected}")
            }
            Self::MinLength { min, actual } => {
                write!(f, "length {actual} is less than minimum length {min}")
            }
            Self::MaxLength { max, actual } => {
                write!(f, "length {actual} exceeds maximum length {max}")
            }
            Self::MinBound { bound, inclusive: true } => write!(f, "value is less than {bound}"),
            Self::MinBound { bound, inclusive: false } => {
                write!(f, "value is not greater than {bound}")
            }
            Self::MaxBound { bound, inclusive: true } => write!(f, "value is greater than {bound}"),
            Self::MaxBound { bound, inclusive: false } => {
                write!(f, "value is not less than {bound}")
            }
            Self::Lexical { value, builtin } => write!(f, "{value:?} is not a valid {builtin}"),
            Self::MemberTypes => write!(f, "value matches none of the member types"),
        }
    }
}

impl Facets {
    pub(crate) fn compile(
        variant: &QName,
        source: FacetSource,
        unsupported: UnsupportedFacetAction,
    ) -> Result<Self, TableError> {
        let pattern = if source.patterns.is_empty() {
            None
        } else {
            // Multiple <pattern> children of one <restriction> form a single regular expression
            // with multiple branches (pt. 2, §4.3.4.2)
            let joined = source.patterns.join("|");
            let branches = source
                .patterns
                .iter()
                .map(|p| format!("(?:{})", translate_pattern(p)))
                .collect::<Vec<_>>()
                .join("|");
            // XSD regular expressions are implicitly anchored at both ends
            match Regex::new(&format!("^(?:{branches})$")) {
                Ok(regex) => Some(Pattern {
                    source: joined,
                    regex,
                }),
                Err(e) => match unsupported {
                    UnsupportedFacetAction::Deny => {
                        return Err(TableError::InvalidPattern {
                            variant: variant.clone(),
                            pattern: joined,
                            source: e,
                        });
                    }
                    UnsupportedFacetAction::Warn => {
                        warn!(%variant, pattern = %joined, "dropping unsupported pattern facet");
                        None
                    }
                    UnsupportedFacetAction::Allow => None,
                },
            }
        };

        let length = |facet: &'static str, value: Option<String>| {
            value
                .map(|v| {
                    v.trim().parse::<usize>().map_err(|_| TableError::InvalidFacet {
                        variant: variant.clone(),
                        facet,
                        value: v.clone(),
                    })
                })
                .transpose()
        };

        let bound = |facet: &'static str, value: Option<String>, inclusive: bool| {
            let Some(literal) = value else {
                return Ok(None);
            };
            match literal.trim().parse::<f64>() {
                Ok(value) => Ok(Some(Bound {
                    literal,
                    value,
                    inclusive,
                })),
                Err(_) => match unsupported {
                    UnsupportedFacetAction::Deny => Err(TableError::InvalidFacet {
                        variant: variant.clone(),
                        facet,
                        value: literal,
                    }),
                    UnsupportedFacetAction::Warn => {
                        warn!(%variant, facet, value = %literal, "dropping non-numeric bound facet");
                        Ok(None)
                    }
                    UnsupportedFacetAction::Allow => Ok(None),
                },
            }
        };

        let min = match bound("minInclusive", source.min_inclusive, true)? {
            Some(b) => Some(b),
            None => bound("minExclusive", source.min_exclusive, false)?,
        };
        let max = match bound("maxInclusive", source.max_inclusive, true)? {
            Some(b) => Some(b),
            None => bound("maxExclusive", source.max_exclusive, false)?,
        };

        Ok(Self {
            pattern,
            enumeration: source.enumeration,
            length: length("length", source.length)?,
            min_length: length("minLength", source.min_length)?,
            max_length: length("maxLength", source.max_length)?,
            min,
            max,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
            && self.enumeration.is_empty()
            && self.length.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.min.is_none()
            && self.max.is_none()
    }

    pub fn pattern(&self) -> Option<&Pattern> {
        self.pattern.as_ref()
    }

    pub fn enumeration(&self) -> &[String] {
        &self.enumeration
    }

    pub fn min_bound(&self) -> Option<&Bound> {
        self.min.as_ref()
    }

    pub fn max_bound(&self) -> Option<&Bound> {
        self.max.as_ref()
    }

    /// Checks an atomic lexical value against the facets of this step only. Lengths count
    /// characters.
    pub fn check(&self, value: &str) -> Vec<FacetViolation> {
        self.check_with_length(value, value.chars().count())
    }

    /// Checks the lexical value of a list with `items` items; lengths count items.
    pub fn check_list(&self, value: &str, items: usize) -> Vec<FacetViolation> {
        self.check_with_length(value, items)
    }

    fn check_with_length(&self, value: &str, actual: usize) -> Vec<FacetViolation> {
        let mut violations = Vec::new();
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(value) {
                violations.push(FacetViolation::Pattern {
                    pattern: pattern.source.clone(),
                });
            }
        }
        if !self.enumeration.is_empty() && !self.enumeration.iter().any(|e| e == value) {
            violations.push(FacetViolation::Enumeration {
                allowed: self.enumeration.clone(),
            });
        }
        if let Some(expected) = self.length {
            if actual != expected {
                violations.push(FacetViolation::Length { expected, actual });
            }
        }
        if let Some(min) = self.min_length {
            if actual < min {
                violations.push(FacetViolation::MinLength { min, actual });
            }
        }
        if let Some(max) = self.max_length {
            if actual > max {
                violations.push(FacetViolation::MaxLength { max, actual });
            }
        }

        if self.min.is_some() || self.max.is_some() {
            // A value that is not a number satisfies no bound
            let number = value.trim().parse::<f64>().ok();
            if let Some(min) = &self.min {
                let ok = number.is_some_and(|n| {
                    if min.inclusive {
                        n >= min.value
                    } else {
                        n > min.value
                    }
                });
                if !ok {
                    violations.push(FacetViolation::MinBound {
                        bound: min.literal.clone(),
                        inclusive: min.inclusive,
                    });
                }
            }
            if let Some(max) = &self.max {
                let ok = number.is_some_and(|n| {
                    if max.inclusive {
                        n <= max.value
                    } else {
                        n < max.value
                    }
                });
                if !ok {
                    violations.push(FacetViolation::MaxBound {
                        bound: max.literal.clone(),
                        inclusive: max.inclusive,
                    });
                }
            }
        }
        violations
    }
}
