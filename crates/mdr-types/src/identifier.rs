use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Digit width used when an identifier is rendered without an explicit width.
pub const DEFAULT_ID_WIDTH: usize = 8;

/// Separator between project, type and number in the text forms.
const SEPARATOR: char = '_';

/// A `(project, type)` pair under which identifiers and documents are scoped.
///
/// The text form is `"{project}_{type}"`. Neither component may contain the
/// separator, so the text form always parses back to the same pair.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace {
    project: String,
    kind: String,
}

impl Namespace {
    /// Create a namespace, validating both components.
    pub fn new(project: impl Into<String>, kind: impl Into<String>) -> Result<Self, TypeError> {
        let project = project.into();
        let kind = kind.into();
        validate_component(&project, "project").map_err(|reason| TypeError::InvalidNamespace {
            value: format!("{project}{SEPARATOR}{kind}"),
            reason,
        })?;
        validate_component(&kind, "type").map_err(|reason| TypeError::InvalidNamespace {
            value: format!("{project}{SEPARATOR}{kind}"),
            reason,
        })?;
        Ok(Self { project, kind })
    }

    /// The project component (e.g. `DocPortal`).
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The type component (e.g. `document`).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Build the identifier with the given number in this namespace.
    pub fn identifier(&self, number: u32) -> Result<Identifier, TypeError> {
        Identifier::new(self.clone(), number)
    }
}

fn validate_component(value: &str, what: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{what} must not be empty"));
    }
    if let Some(ch) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
    {
        return Err(format!("{what} contains forbidden character {ch:?}"));
    }
    Ok(())
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({self})")
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.project, self.kind)
    }
}

impl FromStr for Namespace {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (project, kind) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| TypeError::InvalidNamespace {
                value: s.to_string(),
                reason: "expected {project}_{type}".into(),
            })?;
        Self::new(project, kind)
    }
}

impl TryFrom<String> for Namespace {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.to_string()
    }
}

/// Permanent, namespace-scoped identifier of one metadata document.
///
/// Numbers start at 1. Once handed out a number is never reassigned within
/// its namespace, including after the document it names has been deleted.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier {
    namespace: Namespace,
    number: u32,
}

impl Identifier {
    /// Create an identifier. Fails for number 0.
    pub fn new(namespace: Namespace, number: u32) -> Result<Self, TypeError> {
        if number == 0 {
            return Err(TypeError::InvalidNumber(number));
        }
        Ok(Self { namespace, number })
    }

    /// Parse the text form `"{project}_{type}_{number}"`.
    ///
    /// Any number of digits is accepted; leading zeros are ignored.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidIdentifier {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        let (ns, digits) = s
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| invalid("expected {project}_{type}_{number}"))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("number part must be decimal digits"));
        }
        let number: u32 = digits
            .parse()
            .map_err(|_| invalid("number out of range"))?;
        let namespace: Namespace = ns.parse()?;
        Self::new(namespace, number)
    }

    /// The namespace this identifier belongs to.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The numeric part.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Render with the number zero-padded to `width` digits.
    ///
    /// Numbers longer than `width` are rendered in full, never truncated.
    pub fn render(&self, width: usize) -> String {
        format!(
            "{}{SEPARATOR}{:0width$}",
            self.namespace,
            self.number,
            width = width
        )
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({self})")
    }
}

/// Renders with [`DEFAULT_ID_WIDTH`]. Repositories configured with another
/// width render through [`Identifier::render`].
impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(DEFAULT_ID_WIDTH))
    }
}

impl FromStr for Identifier {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.to_string()
    }
}
