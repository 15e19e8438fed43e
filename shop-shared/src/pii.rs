use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps personal data (emails, phone numbers, street lines) pulled from
/// collaborator services so that it never shows up verbatim in log output.
/// Serialization is transparent: API responses carry the real value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    /// First character followed by asterisks, e.g. `j*******`.
    pub fn redacted(&self) -> String {
        let value = self.0.as_ref();
        match value.chars().next() {
            Some(first) => format!("{}{}", first, "*".repeat(value.chars().count().saturating_sub(1).max(3))),
            None => String::new(),
        }
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Masked({})", self.redacted())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Masked<T> {
    fn from(value: T) -> Self {
        Masked(value)
    }
}
