//! Output extractors
//!
//! Pure parsers that turn the captured output of a step into property
//! updates. All knowledge of command output formats lives here.

use super::errors::PipelineError;
use super::platform::OsClass;
use super::properties::{PropertyUpdate, PropertyValue, keys};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Marker line printed by `make print-JULIA_BINARYDIST_FILENAME`
pub const FILENAME_MARKER: &str = "JULIA_BINARYDIST_FILENAME=";

/// Extractor attached to a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extractor {
    /// `major.minor.patch` and commit hash
    Version,
    /// Subject, committer and author of the head commit
    CommitMetadata,
    /// Binary distribution filename
    ArtifactFilename,
}

impl Extractor {
    /// Runs the extractor over a step's captured output.
    ///
    /// An empty update means "nothing to record" and is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MalformedOutput`] when stdout does not have
    /// the expected shape.
    pub fn extract(
        self,
        _exit_code: i32,
        stdout: &str,
        _stderr: &str,
        os: OsClass,
    ) -> Result<PropertyUpdate, PipelineError> {
        match self {
            Self::Version => Ok(VersionInfo::parse(stdout)?.into_update()),
            Self::CommitMetadata => Ok(CommitMetadata::parse(stdout)?.into_update()),
            Self::ArtifactFilename => Ok(parse_artifact_filename(stdout, os)
                .map(|name| vec![(keys::ARTIFACT_FILENAME.to_string(), name.into())])
                .unwrap_or_default()),
        }
    }

    /// Name used in logs and errors
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::CommitMetadata => "commit metadata",
            Self::ArtifactFilename => "artifact filename",
        }
    }
}

impl fmt::Display for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Version information printed by the freshly built binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// `major.minor`
    pub majmin: String,
    /// Full `major.minor.patch`
    pub version: String,
    /// Abbreviated commit hash
    pub shortcommit: String,
}

impl VersionInfo {
    /// Parses `"<major.minor.patch>\n<commit>"`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MalformedOutput`] for fewer than two lines, a
    /// version without a `.`, or an empty commit line.
    pub fn parse(stdout: &str) -> Result<Self, PipelineError> {
        let lines: Vec<&str> = stdout.split('\n').collect();
        if lines.len() < 2 {
            return Err(PipelineError::malformed(
                "version",
                format!("expected 2 lines, got {}", lines.len()),
            ));
        }

        let version = lines[0].trim();
        let Some(dot) = version.rfind('.') else {
            return Err(PipelineError::malformed(
                "version",
                format!("'{version}' is not a dotted version"),
            ));
        };
        let shortcommit = lines[1].trim();
        if shortcommit.is_empty() {
            return Err(PipelineError::malformed("version", "empty commit hash"));
        }

        Ok(Self {
            majmin: version[..dot].to_string(),
            version: version.to_string(),
            shortcommit: shortcommit.to_string(),
        })
    }

    fn into_update(self) -> PropertyUpdate {
        vec![
            (keys::MAJMIN.to_string(), self.majmin.into()),
            (keys::VERSION.to_string(), self.version.into()),
            (keys::SHORTCOMMIT.to_string(), self.shortcommit.into()),
        ]
    }
}

/// Head commit metadata, as printed by
/// `git log -1 --pretty=format:%s%n%cN%n%cE%n%aN%n%aE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMetadata {
    /// Commit subject line
    pub commitmessage: String,
    /// Committer name
    pub commitname: String,
    /// Committer email
    pub commitemail: String,
    /// Author name
    pub authorname: String,
    /// Author email
    pub authoremail: String,
}

impl CommitMetadata {
    const FIELDS: [&'static str; 5] = [
        "commitmessage",
        "commitname",
        "commitemail",
        "authorname",
        "authoremail",
    ];

    /// Parses five lines in fixed order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MalformedOutput`] for fewer than five lines.
    /// A trailing newline does not count as an extra line.
    pub fn parse(stdout: &str) -> Result<Self, PipelineError> {
        let lines: Vec<&str> = stdout.lines().collect();
        if lines.len() < 5 {
            return Err(PipelineError::malformed(
                "commit metadata",
                format!("expected 5 lines, got {}", lines.len()),
            ));
        }
        let line = |i: usize| lines[i].to_string();
        Ok(Self {
            commitmessage: line(0),
            commitname: line(1),
            commitemail: line(2),
            authorname: line(3),
            authoremail: line(4),
        })
    }

    /// Rebuilds the metadata from the record stored under `commit`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingProperty`] naming the first absent field.
    pub fn from_record(record: &BTreeMap<String, String>) -> Result<Self, PipelineError> {
        let field = |name: &str| {
            record
                .get(name)
                .cloned()
                .ok_or_else(|| PipelineError::MissingProperty(format!("commit.{name}")))
        };
        Ok(Self {
            commitmessage: field("commitmessage")?,
            commitname: field("commitname")?,
            commitemail: field("commitemail")?,
            authorname: field("authorname")?,
            authoremail: field("authoremail")?,
        })
    }

    /// Converts into a record property value
    #[must_use]
    pub fn to_record(&self) -> BTreeMap<String, String> {
        let values = [
            &self.commitmessage,
            &self.commitname,
            &self.commitemail,
            &self.authorname,
            &self.authoremail,
        ];
        Self::FIELDS
            .iter()
            .zip(values)
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn into_update(self) -> PropertyUpdate {
        vec![(
            keys::COMMIT.to_string(),
            PropertyValue::Record(self.to_record()),
        )]
    }
}

/// Recognizes the filename marker line and appends the OS extension.
///
/// Returns `None` when the marker is absent or names no file.
#[must_use]
pub fn parse_artifact_filename(stdout: &str, os: OsClass) -> Option<String> {
    let line = stdout.lines().next()?;
    let stem = line.strip_prefix(FILENAME_MARKER)?.trim_end();
    if stem.is_empty() {
        return None;
    }
    Some(format!("{stem}{}", os.artifact_extension()))
}
