//! Parsed client version types.

use std::fmt;

use serde::Serialize;

/// Numeric version plus the dash-separated suffixes that follow it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Version {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch version
    pub patch: u32,
    /// Free-form tag (e.g. `rc.6`, `stable`)
    pub tag: String,
    /// Build identifier, usually a commit prefix
    pub build: String,
    /// Build date
    pub date: String,
}

impl Version {
    /// True if the numeric part resolved to `0.0.0`.
    pub fn is_zero(&self) -> bool {
        self.major == 0 && self.minor == 0 && self.patch == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        for part in [&self.tag, &self.build, &self.date] {
            if !part.is_empty() {
                write!(f, "-{}", part)?;
            }
        }
        Ok(())
    }
}

/// Operating system and architecture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OsInfo {
    /// Operating system name
    pub os: String,
    /// CPU architecture
    pub architecture: String,
}

/// Language runtime the client was built with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    /// Runtime name (e.g. `go`, `rustc`)
    pub name: String,
    /// Runtime version
    pub version: String,
}

/// Structured form of a client identification string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedVersion {
    /// Client name
    pub name: String,
    /// Optional secondary identifier
    pub label: String,
    /// Client version
    pub version: Version,
    /// Target platform
    pub os: OsInfo,
    /// Build runtime
    pub runtime: RuntimeInfo,
    /// Could not be confidently parsed
    pub error: bool,
}

impl ParsedVersion {
    /// Result for an input that could not be parsed.
    pub fn unparseable() -> Self {
        Self {
            error: true,
            ..Self::default()
        }
    }

    /// The parsed value, or `None` if it is flagged as unparseable.
    pub fn ok(self) -> Option<Self> {
        if self.error {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for ParsedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.error {
            return f.write_str("<unparseable>");
        }
        write!(f, "{} ({})", self.name, self.version)?;
        if !self.os.os.is_empty() {
            write!(f, " {}", self.os.os)?;
            if !self.os.architecture.is_empty() {
                write!(f, "-{}", self.os.architecture)?;
            }
        }
        if !self.runtime.version.is_empty() {
            write!(f, " {}{}", self.runtime.name, self.runtime.version)?;
        }
        Ok(())
    }
}
