//! Renderers
//!
//! Pure functions that compute store paths, URLs and command lines from the
//! state of a run at the moment a step starts. Nothing here is evaluated when
//! the pipeline is defined.

use super::artifact::{ArtifactIdentity, UploadDestination};
use super::errors::PipelineError;
use super::platform::{OsClass, Platform};
use super::properties::{PropertyStore, keys};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Julia expression printing `major.minor.patch` and a 10 character commit
const VERSION_EXPR: &str = "println(\"$(VERSION.major).$(VERSION.minor).$(VERSION.patch)\\n$(Base.GIT_VERSION_INFO.commit[1:10])\")";

/// Number of upload attempts before a publish is reported as failed
pub const UPLOAD_ATTEMPTS: u32 = 3;

/// Naming and location settings shared by every renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseLayout {
    /// Product name, also the leading filename segment (`julia`)
    pub product: String,
    /// Path of the built binary relative to the checkout
    pub binary: String,
    /// Top-level component of every store path
    pub store_root: String,
    /// Public base URL the store is served from
    pub base_url: String,
    /// Upload tool invoked on the controller
    pub uploader: String,
    /// Controller directory artifacts are staged in before upload
    pub staging_root: PathBuf,
}

impl Default for ReleaseLayout {
    fn default() -> Self {
        Self {
            product: "julia".to_string(),
            binary: "usr/bin/julia".to_string(),
            store_root: "julianightlies".to_string(),
            base_url: "https://s3.amazonaws.com/".to_string(),
            uploader: "~/bin/aws".to_string(),
            staging_root: PathBuf::from("/tmp/julia_package"),
        }
    }
}

impl ReleaseLayout {
    /// Controller-side path of a staged artifact
    #[must_use]
    pub fn staged_path(&self, filename: &str) -> PathBuf {
        self.staging_root.join(filename)
    }
}

/// `<root>/bin/<os>/<arch>/<majmin>/<filename>`
#[must_use]
pub fn upload_path(layout: &ReleaseLayout, id: &ArtifactIdentity) -> String {
    format!(
        "{}/bin/{}/{}/{}/{}",
        layout.store_root, id.os_name, id.arch, id.majmin, id.filename
    )
}

/// Rewrites `julia-1.2.3-linux64.tar.gz` to `julia-latest-1.2.3-linux64.tar.gz`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidArtifactFilename`] if the filename has no
/// hyphen or its leading segment is not the product name.
pub fn latest_filename(product: &str, filename: &str) -> Result<String, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidArtifactFilename {
        filename: filename.to_string(),
        reason,
    };

    let Some((prefix, rest)) = filename.split_once('-') else {
        return Err(invalid("no '-' after the product name".to_string()));
    };
    if prefix != product {
        return Err(invalid(format!("expected leading segment '{product}'")));
    }
    Ok(format!("{product}-latest-{rest}"))
}

/// `<root>/bin/latest/<os>/<arch>/<product>-latest-<rest>`
///
/// # Errors
///
/// See [`latest_filename`].
pub fn latest_upload_path(
    layout: &ReleaseLayout,
    id: &ArtifactIdentity,
) -> Result<String, PipelineError> {
    Ok(format!(
        "{}/bin/latest/{}/{}/{}",
        layout.store_root,
        id.os_name,
        id.arch,
        latest_filename(&layout.product, &id.filename)?
    ))
}

/// Public download URL of the versioned upload
#[must_use]
pub fn download_url(layout: &ReleaseLayout, id: &ArtifactIdentity) -> String {
    format!("{}{}", layout.base_url, upload_path(layout, id))
}

/// Both destinations of an artifact.
///
/// # Errors
///
/// See [`latest_filename`].
pub fn upload_destination(
    layout: &ReleaseLayout,
    id: &ArtifactIdentity,
) -> Result<UploadDestination, PipelineError> {
    Ok(UploadDestination {
        path: upload_path(layout, id),
        latest_path: latest_upload_path(layout, id)?,
    })
}

/// Description of one upload to the artifact store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCommand {
    /// Store path
    pub destination: String,
    /// Local staged file
    pub source: PathBuf,
    /// Make the object publicly readable
    pub public_read: bool,
    /// Make the tool exit non-zero on any error
    pub fail_on_error: bool,
    /// Attempts before giving up
    pub attempts: u32,
}

impl UploadCommand {
    /// Upload of the staged artifact to `destination`
    #[must_use]
    pub fn new(layout: &ReleaseLayout, id: &ArtifactIdentity, destination: String) -> Self {
        Self {
            destination,
            source: layout.staged_path(&id.filename),
            public_read: true,
            fail_on_error: true,
            attempts: UPLOAD_ATTEMPTS,
        }
    }

    /// Shell invocation of the upload tool
    #[must_use]
    pub fn to_argv(&self, uploader: &str) -> Vec<String> {
        let mut script = format!("{uploader} put");
        if self.fail_on_error {
            script.push_str(" --fail");
        }
        if self.public_read {
            script.push_str(" --public");
        }
        script.push(' ');
        script.push_str(&shell_words::quote(&self.destination));
        script.push(' ');
        script.push_str(&shell_words::quote(&self.source.to_string_lossy()));
        vec!["/bin/bash".to_string(), "-c".to_string(), script]
    }
}

/// Read-only view of a run handed to renderers
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Current properties
    pub store: &'a PropertyStore,
    /// Platform being built
    pub platform: &'a Platform,
    /// Naming settings
    pub layout: &'a ReleaseLayout,
}

impl RenderContext<'_> {
    /// Resolves the artifact identity from the current properties.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingProperty`] if any part is unset.
    pub fn artifact(&self) -> Result<ArtifactIdentity, PipelineError> {
        ArtifactIdentity::resolve(self.store)
    }

    /// Resolves both store destinations of the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingProperty`] if any part of the identity
    /// is unset, and [`PipelineError::InvalidArtifactFilename`] if the
    /// filename cannot be aliased as "latest".
    pub fn destination(&self) -> Result<UploadDestination, PipelineError> {
        upload_destination(self.layout, &self.artifact()?)
    }
}

/// Commands computed when their step starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandRenderer {
    /// Clean checkout of the requested repository and branch
    Checkout,
    /// Ask the built binary for its version and commit
    VersionQuery,
    /// Upload to the versioned store path
    Upload,
    /// Upload to the "latest" alias path
    LatestUpload,
    /// Remove the staged copy on the controller
    CleanupStaging,
}

impl CommandRenderer {
    /// Produces the argv for this command.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingProperty`] when a property the command
    /// needs has not been written, and
    /// [`PipelineError::InvalidArtifactFilename`] for either upload of a
    /// filename that cannot be aliased.
    pub fn render(self, ctx: &RenderContext<'_>) -> Result<Vec<String>, PipelineError> {
        match self {
            Self::Checkout => {
                let repository = ctx.store.get_text(keys::REPOSITORY)?;
                let branch = ctx.store.get_text(keys::BRANCH)?;
                Ok(checkout_argv(repository, branch))
            }
            Self::VersionQuery => {
                let mut binary = ctx.layout.binary.clone();
                if ctx.platform.os == OsClass::Windows {
                    binary.push_str(".exe");
                }
                Ok(vec![binary, "-e".to_string(), VERSION_EXPR.to_string()])
            }
            Self::Upload | Self::LatestUpload => {
                let id = ctx.artifact()?;
                let destination = upload_destination(ctx.layout, &id)?
                    .target(self == Self::LatestUpload)
                    .to_string();
                Ok(UploadCommand::new(ctx.layout, &id, destination).to_argv(&ctx.layout.uploader))
            }
            Self::CleanupStaging => {
                let filename = ctx.store.get_text(keys::ARTIFACT_FILENAME)?;
                Ok(vec![
                    "rm".to_string(),
                    "-f".to_string(),
                    ctx.layout.staged_path(filename).to_string_lossy().into_owned(),
                ])
            }
        }
    }
}

impl fmt::Display for CommandRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checkout => write!(f, "<checkout>"),
            Self::VersionQuery => write!(f, "<version query>"),
            Self::Upload => write!(f, "<upload>"),
            Self::LatestUpload => write!(f, "<upload latest>"),
            Self::CleanupStaging => write!(f, "<remove staged artifact>"),
        }
    }
}

fn checkout_argv(repository: &str, branch: &str) -> Vec<String> {
    let repo = shell_words::quote(repository);
    let branch = shell_words::quote(branch);
    let script = format!(
        "if [ -d .git ]; then git remote set-url origin {repo}; \
         else git init -q . && git remote add origin {repo}; fi && \
         git fetch --force origin {branch} && \
         git checkout --force FETCH_HEAD && \
         git clean -xdff && \
         git submodule update --init --recursive"
    );
    vec!["/bin/bash".to_string(), "-c".to_string(), script]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::platform::{PlatformMatrix, default_platforms};
    use pretty_assertions::assert_eq;

    fn identity(filename: &str) -> ArtifactIdentity {
        ArtifactIdentity {
            os_name: "linux".into(),
            arch: "x64".into(),
            majmin: "1.2".into(),
            version: "1.2.3".into(),
            shortcommit: "abcdef1234".into(),
            filename: filename.into(),
        }
    }

    #[test]
    fn test_upload_path() {
        let layout = ReleaseLayout::default();
        assert_eq!(
            upload_path(&layout, &identity("julia-1.2.3-linux64.tar.gz")),
            "julianightlies/bin/linux/x64/1.2/julia-1.2.3-linux64.tar.gz"
        );
    }

    #[test]
    fn test_latest_upload_path() {
        let layout = ReleaseLayout::default();
        let path = latest_upload_path(&layout, &identity("julia-1.2.3-linux64.tar.gz")).unwrap();
        assert_eq!(
            path,
            "julianightlies/bin/latest/linux/x64/julia-latest-1.2.3-linux64.tar.gz"
        );
        assert!(path.contains("julia-latest-1.2.3-linux64.tar.gz"));
    }

    #[test]
    fn test_latest_filename_requires_product_prefix() {
        assert!(matches!(
            latest_filename("julia", "julia.tar.gz"),
            Err(PipelineError::InvalidArtifactFilename { .. })
        ));
        assert!(latest_filename("julia", "other-1.0.tar.gz").is_err());
    }

    #[test]
    fn test_upload_destination_linux64() {
        let layout = ReleaseLayout::default();
        let dest = upload_destination(&layout, &identity("julia-1.2.3-linux64.tar.gz")).unwrap();
        assert_eq!(
            dest,
            UploadDestination {
                path: "julianightlies/bin/linux/x64/1.2/julia-1.2.3-linux64.tar.gz".into(),
                latest_path: "julianightlies/bin/latest/linux/x64/julia-latest-1.2.3-linux64.tar.gz"
                    .into(),
            }
        );
        assert!(matches!(
            upload_destination(&layout, &identity("nightly.tar.gz")),
            Err(PipelineError::InvalidArtifactFilename { .. })
        ));
    }

    #[test]
    fn test_upload_renderers_share_destination() {
        let matrix = PlatformMatrix::from_entries(&default_platforms()).unwrap();
        let platform = matrix.lookup("package_linux64").unwrap();
        let layout = ReleaseLayout::default();
        let mut store = PropertyStore::new();
        for (k, v) in [
            (keys::OS_NAME, "linux"),
            (keys::UP_ARCH, "x64"),
            (keys::MAJMIN, "1.2"),
            (keys::VERSION, "1.2.3"),
            (keys::SHORTCOMMIT, "abcdef1234"),
            (keys::ARTIFACT_FILENAME, "julia-1.2.3-linux64.tar.gz"),
        ] {
            store.set(k, v).unwrap();
        }
        let ctx = RenderContext { store: &store, platform, layout: &layout };
        let dest = ctx.destination().unwrap();

        let upload = CommandRenderer::Upload.render(&ctx).unwrap();
        assert!(upload[2].contains(&format!(" {} ", dest.path)));
        let latest = CommandRenderer::LatestUpload.render(&ctx).unwrap();
        assert!(latest[2].contains(&format!(" {} ", dest.latest_path)));
    }

    #[test]
    fn test_download_url() {
        let layout = ReleaseLayout::default();
        assert_eq!(
            download_url(&layout, &identity("julia-1.2.3-linux64.tar.gz")),
            "https://s3.amazonaws.com/julianightlies/bin/linux/x64/1.2/julia-1.2.3-linux64.tar.gz"
        );
    }

    #[test]
    fn test_upload_command_argv() {
        let layout = ReleaseLayout::default();
        let id = identity("julia-1.2.3-linux64.tar.gz");
        let cmd = UploadCommand::new(&layout, &id, upload_path(&layout, &id));
        assert_eq!(cmd.attempts, 3);
        assert!(cmd.public_read && cmd.fail_on_error);
        assert_eq!(
            cmd.to_argv("~/bin/aws"),
            vec![
                "/bin/bash".to_string(),
                "-c".to_string(),
                "~/bin/aws put --fail --public julianightlies/bin/linux/x64/1.2/julia-1.2.3-linux64.tar.gz /tmp/julia_package/julia-1.2.3-linux64.tar.gz".to_string(),
            ]
        );
    }

    #[test]
    fn test_render_reads_store_at_call_time() {
        let matrix = PlatformMatrix::from_entries(&default_platforms()).unwrap();
        let platform = matrix.lookup("package_linux64").unwrap();
        let layout = ReleaseLayout::default();
        let mut store = PropertyStore::new();

        let err = {
            let ctx = RenderContext { store: &store, platform, layout: &layout };
            CommandRenderer::CleanupStaging.render(&ctx).unwrap_err()
        };
        assert_eq!(err, PipelineError::MissingProperty("artifact_filename".into()));

        store.set(keys::ARTIFACT_FILENAME, "julia-1.2.3-linux64.tar.gz").unwrap();
        let ctx = RenderContext { store: &store, platform, layout: &layout };
        assert_eq!(
            CommandRenderer::CleanupStaging.render(&ctx).unwrap(),
            vec!["rm", "-f", "/tmp/julia_package/julia-1.2.3-linux64.tar.gz"]
        );
    }

    #[test]
    fn test_version_query_on_windows() {
        let matrix = PlatformMatrix::from_entries(&default_platforms()).unwrap();
        let layout = ReleaseLayout::default();
        let store = PropertyStore::new();

        let win = matrix.lookup("package_win64").unwrap();
        let ctx = RenderContext { store: &store, platform: win, layout: &layout };
        assert_eq!(CommandRenderer::VersionQuery.render(&ctx).unwrap()[0], "usr/bin/julia.exe");

        let linux = matrix.lookup("package_linux64").unwrap();
        let ctx = RenderContext { store: &store, platform: linux, layout: &layout };
        assert_eq!(CommandRenderer::VersionQuery.render(&ctx).unwrap()[0], "usr/bin/julia");
    }

    #[test]
    fn test_checkout_quotes_inputs() {
        let argv = checkout_argv("git://github.com/JuliaLang/julia.git", "release-0.6");
        assert_eq!(argv[0], "/bin/bash");
        assert!(argv[2].contains("git fetch --force origin release-0.6"));
        let argv = checkout_argv("repo; rm -rf /", "master");
        assert!(argv[2].contains("'repo; rm -rf /'"));
    }
}
