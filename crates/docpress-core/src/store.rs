//! Artifact store: the two directories of transient files and their naming.
//!
//! Every artifact name is prefixed with the owning job's token, so concurrent
//! jobs never share a path and no locking is needed.
//!
//! Layout:
//! - input:  `<upload_dir>/<token>_<sanitized original name>`
//! - output: `<output_dir>/<token>_<sanitized original stem>.pdf`
//! - claimed output (download in progress): `<output name>.served`

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::error::{ConvertError, Result};
use crate::job::JobToken;

/// The only accepted upload extension.
pub const INPUT_EXTENSION: &str = "docx";
/// Extension of every produced artifact.
pub const OUTPUT_EXTENSION: &str = "pdf";
/// Media type of every produced artifact.
pub const OUTPUT_MEDIA_TYPE: &str = "application/pdf";

const CLAIMED_SUFFIX: &str = ".served";

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl ArtifactStore {
    /// Create both directories if absent.
    pub fn open(config: &ServiceConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.upload_dir)?;
        std::fs::create_dir_all(&config.output_dir)?;
        Ok(Self {
            upload_dir: config.upload_dir.clone(),
            output_dir: config.output_dir.clone(),
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Allocate a fresh token and the input path for `original_name`.
    ///
    /// The file itself is not created. The upload directory is re-created if
    /// something removed it since startup.
    pub async fn reserve(&self, original_name: &str) -> Result<(JobToken, PathBuf)> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let token = JobToken::generate();
        let name = sanitize_file_name(original_name);
        Ok((token, self.upload_dir.join(format!("{token}_{name}"))))
    }

    pub fn output_path_for(&self, token: JobToken, original_stem: &str) -> PathBuf {
        let stem = sanitize_chars(original_stem);
        self.output_dir
            .join(format!("{token}_{stem}.{OUTPUT_EXTENSION}"))
    }

    /// Remove `path`. Returns `false` when there was nothing to remove.
    pub async fn delete(&self, path: &Path) -> Result<bool> {
        delete_file(path).await
    }

    /// Map a download reference to an existing output artifact.
    pub async fn resolve_output(&self, name: &str) -> Result<PathBuf> {
        let path = self.reference_path(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(ConvertError::NotFound(name.to_owned())),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                Err(ConvertError::NotFound(name.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Take exclusive ownership of an output for delivery.
    ///
    /// The artifact is renamed out of the servable namespace, so of any number
    /// of concurrent claims exactly one succeeds.
    pub async fn claim_output(&self, name: &str) -> Result<PathBuf> {
        let path = self.reference_path(name)?;
        let claimed = self.output_dir.join(format!("{name}{CLAIMED_SUFFIX}"));
        match tokio::fs::rename(&path, &claimed).await {
            Ok(()) => Ok(claimed),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                Err(ConvertError::NotFound(name.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every file in both directories at least `max_age` old.
    pub async fn sweep(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        for dir in [&self.upload_dir, &self.output_dir] {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == IoErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let meta = match entry.metadata().await {
                    Ok(meta) if meta.is_file() => meta,
                    _ => continue,
                };
                let age = meta
                    .modified()
                    .ok()
                    .and_then(|m| now.duration_since(m).ok())
                    .unwrap_or_default();
                if age >= max_age && delete_file(&entry.path()).await? {
                    debug!(path = %entry.path().display(), age_secs = age.as_secs(), "swept expired artifact");
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn reference_path(&self, name: &str) -> Result<PathBuf> {
        let servable = !name.is_empty()
            && !name.contains(['/', '\\'])
            && !name.contains("..")
            && name
                .rsplit_once('.')
                .is_some_and(|(stem, ext)| !stem.is_empty() && ext == OUTPUT_EXTENSION);
        if servable {
            Ok(self.output_dir.join(name))
        } else {
            Err(ConvertError::NotFound(name.to_owned()))
        }
    }
}

/// Deletes the input artifact when dropped, whichever way the request ends.
#[derive(Debug)]
pub struct InputGuard {
    path: PathBuf,
}

impl InputGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "input artifact removed"),
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove input artifact"),
        }
    }
}

/// Keep only the final path component, replace anything outside
/// `[A-Za-z0-9._-]` with `_`, and break up `..` runs. The extension survives
/// unchanged apart from character replacement.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, extension) = match last.rsplit_once('.') {
        Some((stem, extension)) => (stem, sanitize_chars(extension)),
        None => (last, String::new()),
    };
    let mut stem = sanitize_chars(stem);
    while stem.contains("..") {
        stem = stem.replace("..", "_");
    }
    let stem = match stem.trim_end_matches('.') {
        s if s.trim_matches('.').is_empty() => "document",
        s => s,
    };
    if extension.is_empty() {
        stem.to_owned()
    } else {
        format!("{stem}.{extension}")
    }
}

/// Stem of the sanitized form of `name`; what output names are built from.
pub fn original_stem(name: &str) -> String {
    let sanitized = sanitize_file_name(name);
    match sanitized.rsplit_once('.') {
        Some((stem, _)) => stem.to_owned(),
        None => sanitized,
    }
}

fn sanitize_chars(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Extension of `name`, lowercased.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

pub(crate) async fn delete_file(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(&ServiceConfig::rooted_at(dir.path())).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_directories() {
        let (_dir, store) = store();
        assert!(store.upload_dir().is_dir());
        assert!(store.output_dir().is_dir());
    }

    #[tokio::test]
    async fn reserve_preserves_extension_and_is_unique() {
        let (_dir, store) = store();
        let (t1, p1) = store.reserve("report.docx").await.unwrap();
        let (t2, p2) = store.reserve("report.docx").await.unwrap();
        assert_ne!(t1, t2);
        assert_ne!(p1, p2);
        assert_eq!(p1.extension().unwrap(), "docx");
        assert!(p1.starts_with(store.upload_dir()));
        assert_eq!(
            p1.file_name().unwrap().to_string_lossy(),
            format!("{t1}_report.docx")
        );
        assert!(!p1.exists(), "reserve must not create the file");
    }

    #[tokio::test]
    async fn reserve_strips_client_directories() {
        let (_dir, store) = store();
        let (_, path) = store.reserve("../../etc/evil report.docx").await.unwrap();
        assert_eq!(path.parent().unwrap(), store.upload_dir());
        assert!(path.to_string_lossy().ends_with("_evil_report.docx"));
    }

    #[test]
    fn output_path_matches_input_stem() {
        let (_dir, store) = store();
        let token = JobToken::generate();
        let out = store.output_path_for(token, "report");
        assert_eq!(out, store.output_dir().join(format!("{token}_report.pdf")));
        assert_eq!(out, store.output_path_for(token, "report"));
    }

    #[test]
    fn sanitize_handles_edge_cases() {
        assert_eq!(sanitize_file_name("a b/c d.docx"), "c_d.docx");
        assert_eq!(sanitize_file_name("C:\\docs\\x.docx"), "x.docx");
        assert_eq!(sanitize_file_name(".."), "document");
        assert_eq!(sanitize_file_name("a..b.docx"), "a_b.docx");
        assert_eq!(sanitize_file_name("résumé.docx"), "r_sum_.docx");
        assert_eq!(sanitize_file_name("x."), "x");
    }

    #[tokio::test]
    async fn dotted_names_keep_their_extension() {
        let (_dir, store) = store();
        for (name, stored) in [
            ("..docx", "document.docx"),
            ("a..docx", "a.docx"),
            ("...docx", "_.docx"),
            (".docx", "document.docx"),
            ("x..y...DOCX", "x_y_.DOCX"),
        ] {
            assert_eq!(sanitize_file_name(name), stored, "{name}");
            let (token, path) = store.reserve(name).await.unwrap();
            assert_eq!(
                path.file_name().unwrap().to_string_lossy(),
                format!("{token}_{stored}")
            );
            assert_eq!(
                extension_of(&path.to_string_lossy()).as_deref(),
                Some("docx"),
                "{name}"
            );
        }
    }

    #[test]
    fn stem_drops_extension_only() {
        assert_eq!(original_stem("report.final.docx"), "report.final");
        assert_eq!(original_stem("dir/notes"), "notes");
        assert_eq!(original_stem("..docx"), "document");
    }

    #[tokio::test]
    async fn output_name_tracks_input_stem() {
        let (_dir, store) = store();
        for name in ["report.docx", "my report.v2.DOCX", "..docx", "a..docx", ".docx", "x."] {
            let (token, input) = store.reserve(name).await.unwrap();
            let from_input = store
                .output_dir()
                .join(format!("{}.pdf", input.file_stem().unwrap().to_string_lossy()));
            assert_eq!(store.output_path_for(token, &original_stem(name)), from_input, "{name}");
        }
    }

    #[test]
    fn extension_is_case_insensitive() {
        assert_eq!(extension_of("A.DOCX").as_deref(), Some("docx"));
        assert_eq!(extension_of("notes.txt").as_deref(), Some("txt"));
        assert_eq!(extension_of("docx"), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, store) = store();
        let path = store.output_dir().join("x.pdf");
        tokio::fs::write(&path, b"%PDF").await.unwrap();
        assert!(store.delete(&path).await.unwrap());
        assert!(!store.delete(&path).await.unwrap());
    }

    #[tokio::test]
    async fn resolve_rejects_unservable_names() {
        let (_dir, store) = store();
        tokio::fs::write(store.output_dir().join("ok.pdf"), b"%PDF").await.unwrap();
        assert!(store.resolve_output("ok.pdf").await.is_ok());
        for name in ["", "../ok.pdf", "a/ok.pdf", "a\\ok.pdf", "ok.pdf.served", ".pdf", "missing.pdf"] {
            assert!(
                matches!(store.resolve_output(name).await, Err(ConvertError::NotFound(_))),
                "{name:?} should not resolve"
            );
        }
    }

    #[tokio::test]
    async fn claim_succeeds_once() {
        let (_dir, store) = store();
        tokio::fs::write(store.output_dir().join("one.pdf"), b"%PDF").await.unwrap();

        let claimed = store.claim_output("one.pdf").await.unwrap();
        assert!(claimed.exists());
        assert!(matches!(
            store.claim_output("one.pdf").await,
            Err(ConvertError::NotFound(_))
        ));
        assert!(store.resolve_output("one.pdf").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_have_one_winner() {
        let (_dir, store) = store();
        tokio::fs::write(store.output_dir().join("race.pdf"), b"%PDF").await.unwrap();

        let claims = (0..8).map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.claim_output("race.pdf").await.is_ok() })
        });
        let wins = futures::future::join_all(claims)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn sweep_respects_age() {
        let (_dir, store) = store();
        tokio::fs::write(store.output_dir().join("a.pdf"), b"%PDF").await.unwrap();
        tokio::fs::write(store.upload_dir().join("b.docx"), b"PK").await.unwrap();

        assert_eq!(store.sweep(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(store.sweep(Duration::ZERO).await.unwrap(), 2);
        assert!(!store.output_dir().join("a.pdf").exists());
    }

    #[test]
    fn guard_removes_input_on_drop() {
        let (_dir, store) = store();
        let path = store.upload_dir().join("in.docx");
        std::fs::write(&path, b"PK").unwrap();
        {
            let guard = InputGuard::new(path.clone());
            assert_eq!(guard.path(), path);
        }
        assert!(!path.exists());
        // Dropping a guard for a file that never existed is a no-op.
        drop(InputGuard::new(store.upload_dir().join("never.docx")));
    }
}
