//! ROS graph resource names (topic and node names).

use roslibrust_common::Error;

/// A validated ROS graph resource name.
///
/// Only the subset of the ROS naming rules relevant to a configuration-time check is
/// enforced here: non-empty, absolute (starts with `/`), and composed of ASCII
/// alphanumerics, underscores, and `/` separators. Resolving relative or private (`~`)
/// names against a namespace is a node-level concern and out of scope for this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(String);

impl Name {
    pub fn new(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::InvalidName("name is empty".to_string()));
        }
        if !raw.starts_with('/') {
            return Err(Error::InvalidName(format!("name `{raw}` is not absolute (must start with '/')")));
        }
        let body_is_valid = raw[1..]
            .split('/')
            .all(|segment| !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        if !body_is_valid {
            return Err(Error::InvalidName(format!("name `{raw}` contains an invalid segment")));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
