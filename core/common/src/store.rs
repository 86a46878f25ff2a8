// core/common/src/store.rs
// Artifact storage: the store interface, a filesystem store and the remote logger

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ArtifactError;
use crate::metrics::ArtifactMetrics;

/// Named blob storage shared by every rank of a run.
pub trait ArtifactStore: Send + Sync {
    fn upload(&self, local_path: &Path, remote_name: &str) -> Result<(), ArtifactError>;
    fn download(&self, remote_name: &str, local_path: &Path) -> Result<(), ArtifactError>;
}

impl<S: ArtifactStore + ?Sized> ArtifactStore for Arc<S> {
    fn upload(&self, local_path: &Path, remote_name: &str) -> Result<(), ArtifactError> {
        (**self).upload(local_path, remote_name)
    }

    fn download(&self, remote_name: &str, local_path: &Path) -> Result<(), ArtifactError> {
        (**self).download(remote_name, local_path)
    }
}

pub fn validate_remote_name(name: &str) -> Result<(), ArtifactError> {
    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(ArtifactError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Store backed by a directory, e.g. a shared mount visible to all ranks.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, remote_name: &str) -> PathBuf {
        self.root.join(remote_name)
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn upload(&self, local_path: &Path, remote_name: &str) -> Result<(), ArtifactError> {
        validate_remote_name(remote_name)?;
        fs::create_dir_all(&self.root).map_err(|e| destination_error(&self.root, e))?;

        // Stage next to the target so the rename stays on one filesystem.
        let staging = self
            .root
            .join(format!(".{}.{}.partial", remote_name, Uuid::new_v4()));
        if let Err(e) = copy_file(local_path, &staging) {
            let _ = fs::remove_file(&staging);
            return Err(match e {
                CopyError::Read(e) => ArtifactError::from_io(local_path, e),
                CopyError::Write(e) => destination_error(&staging, e),
            });
        }

        let target = self.object_path(remote_name);
        if let Err(e) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(destination_error(&target, e));
        }

        debug!(artifact = remote_name, path = %target.display(), "Artifact stored");
        Ok(())
    }

    fn download(&self, remote_name: &str, local_path: &Path) -> Result<(), ArtifactError> {
        validate_remote_name(remote_name)?;
        let source = self.object_path(remote_name);

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).map_err(|e| destination_error(parent, e))?;
        }

        copy_file(&source, local_path).map_err(|e| match e {
            CopyError::Read(e) if e.kind() == io::ErrorKind::NotFound => {
                ArtifactError::NotFound(remote_name.to_string())
            }
            CopyError::Read(e) => ArtifactError::from_io(&source, e),
            CopyError::Write(e) => destination_error(local_path, e),
        })
    }
}

enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

fn copy_file(from: &Path, to: &Path) -> Result<(), CopyError> {
    let mut reader = fs::File::open(from).map_err(CopyError::Read)?;
    let mut writer = fs::File::create(to).map_err(CopyError::Write)?;
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(CopyError::Write)?;
    }
    writer.flush().map_err(CopyError::Write)
}

/// Failures on our own side of a transfer never mean the artifact is missing.
fn destination_error(path: &Path, err: io::Error) -> ArtifactError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            ArtifactError::PermissionDenied(path.display().to_string())
        }
        _ => ArtifactError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteLoggerOptions {
    /// Only rank zero uploads.
    pub rank_zero_only: bool,
    pub log_artifacts: bool,
}

impl Default for RemoteLoggerOptions {
    fn default() -> Self {
        Self {
            rank_zero_only: false,
            log_artifacts: true,
        }
    }
}

/// Uploads and fetches run artifacts through an [`ArtifactStore`].
pub struct RemoteLogger<S> {
    store: S,
    options: RemoteLoggerOptions,
    metrics: Option<ArtifactMetrics>,
}

impl<S: ArtifactStore> RemoteLogger<S> {
    pub fn new(store: S, options: RemoteLoggerOptions) -> Self {
        if options.rank_zero_only && options.log_artifacts {
            warn!(
                "rank_zero_only should be set to false when logging artifacts; \
                 non-zero ranks will not upload"
            );
        }

        Self {
            store,
            options,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ArtifactMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> RemoteLoggerOptions {
        self.options
    }

    pub fn metrics(&self) -> Option<&ArtifactMetrics> {
        self.metrics.as_ref()
    }

    /// Uploads `file_path` as `remote_name`. Returns `false` when this rank skips uploads.
    pub fn upload_file(
        &self,
        rank: usize,
        file_path: &Path,
        remote_name: &str,
    ) -> Result<bool, ArtifactError> {
        if !self.options.log_artifacts || (self.options.rank_zero_only && rank != 0) {
            debug!(rank, artifact = remote_name, "Skipping artifact upload");
            return Ok(false);
        }

        let result = self.store.upload(file_path, remote_name);
        if let Some(metrics) = &self.metrics {
            metrics.record_upload(status_label(&result));
        }
        result?;

        info!(rank, artifact = remote_name, "Artifact uploaded");
        Ok(true)
    }

    pub fn download_file(&self, remote_name: &str, destination: &Path) -> Result<(), ArtifactError> {
        let result = self.store.download(remote_name, destination);
        if let Some(metrics) = &self.metrics {
            metrics.record_download(status_label(&result));
        }
        if let Err(e) = &result {
            debug!(artifact = remote_name, error_code = e.error_code(), "Artifact download failed");
        }
        result
    }
}

fn status_label<T>(result: &Result<T, ArtifactError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.error_code(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use prometheus::Registry;
    use std::sync::Mutex;
    use crate::retry::Retryable;

    pub(crate) fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("runlog-{}-{}", label, Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_validate_remote_name() {
        assert!(validate_remote_name("test-artifact-1").is_ok());
        assert!(validate_remote_name("model.ckpt").is_ok());

        for bad in ["", ".", "..", "a/b", "a\\b", "../escape"] {
            assert!(
                matches!(validate_remote_name(bad), Err(ArtifactError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_upload_then_download() {
        let dir = scratch_dir("store");
        let store = LocalArtifactStore::new(dir.join("remote"));
        let source = dir.join("artifact.txt");
        fs::write(&source, "hello!").unwrap();

        store.upload(&source, "greeting").unwrap();

        let destination = dir.join("nested").join("downloaded");
        store.download("greeting", &destination).unwrap();
        assert_eq!(fs::read_to_string(&destination).unwrap(), "hello!");

        let leftovers: Vec<_> = fs::read_dir(store.root())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_download_missing_is_not_found() {
        let dir = scratch_dir("store-missing");
        let store = LocalArtifactStore::new(dir.join("remote"));

        let err = store.download("absent", &dir.join("out")).unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound(ref name) if name == "absent"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_upload_missing_local_file() {
        let dir = scratch_dir("store-upload");
        let store = LocalArtifactStore::new(dir.join("remote"));

        let err = store.upload(&dir.join("nope.txt"), "name").unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound(_)));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_download_into_directory_blames_destination() {
        let dir = scratch_dir("store-dest-dir");
        let store = LocalArtifactStore::new(dir.join("remote"));
        let source = dir.join("artifact.txt");
        fs::write(&source, "hello!").unwrap();
        store.upload(&source, "greeting").unwrap();

        let destination = dir.join("occupied");
        fs::create_dir_all(&destination).unwrap();

        let err = store.download("greeting", &destination).unwrap_err();
        assert!(
            matches!(err, ArtifactError::Io { ref path, .. } if path == &destination),
            "unexpected error: {err:?}"
        );
        assert!(!err.is_retryable());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_download_under_file_parent_blames_destination() {
        let dir = scratch_dir("store-dest-parent");
        let store = LocalArtifactStore::new(dir.join("remote"));
        let source = dir.join("artifact.txt");
        fs::write(&source, "hello!").unwrap();
        store.upload(&source, "greeting").unwrap();

        let blocker = dir.join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        let err = store
            .download("greeting", &blocker.join("downloaded"))
            .unwrap_err();
        assert!(
            matches!(err, ArtifactError::Io { ref path, .. } if path == &blocker),
            "unexpected error: {err:?}"
        );
        assert!(!err.is_retryable());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn build_logger_capturing(options: RemoteLoggerOptions, root: PathBuf) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let _ = RemoteLogger::new(LocalArtifactStore::new(root), options);
        });
        logs.contents()
    }

    #[test]
    fn test_rank_zero_only_with_artifacts_warns() {
        let dir = scratch_dir("logger-warn");

        let output = build_logger_capturing(
            RemoteLoggerOptions {
                rank_zero_only: true,
                log_artifacts: true,
            },
            dir.join("remote"),
        );
        assert!(output.contains("WARN"), "missing warning in {output:?}");
        assert!(output.contains("rank_zero_only should be set to false"));

        let output = build_logger_capturing(RemoteLoggerOptions::default(), dir.join("remote"));
        assert!(!output.contains("rank_zero_only"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rank_zero_only_skips_other_ranks() {
        let dir = scratch_dir("logger");
        let source = dir.join("artifact.txt");
        fs::write(&source, "hello!").unwrap();

        let logger = RemoteLogger::new(
            LocalArtifactStore::new(dir.join("remote")),
            RemoteLoggerOptions {
                rank_zero_only: true,
                log_artifacts: true,
            },
        );

        assert!(!logger.upload_file(1, &source, "from-rank-1").unwrap());
        assert!(matches!(
            logger.download_file("from-rank-1", &dir.join("out")),
            Err(ArtifactError::NotFound(_))
        ));

        assert!(logger.upload_file(0, &source, "from-rank-0").unwrap());
        logger.download_file("from-rank-0", &dir.join("out")).unwrap();

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_logger_records_metrics() {
        let dir = scratch_dir("logger-metrics");
        let source = dir.join("artifact.txt");
        fs::write(&source, "hello!").unwrap();

        let registry = Registry::new();
        let metrics = ArtifactMetrics::new(&registry, "test_logger").unwrap();
        let logger = RemoteLogger::new(
            LocalArtifactStore::new(dir.join("remote")),
            RemoteLoggerOptions::default(),
        )
        .with_metrics(metrics);

        let _ = logger.download_file("artifact", &dir.join("out"));
        logger.upload_file(3, &source, "artifact").unwrap();
        logger.download_file("artifact", &dir.join("out")).unwrap();

        let metrics = logger.metrics().unwrap();
        assert_eq!(metrics.uploads_total.with_label_values(&["success"]).get(), 1);
        assert_eq!(metrics.downloads_total.with_label_values(&["not_found"]).get(), 1);
        assert_eq!(metrics.downloads_total.with_label_values(&["success"]).get(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }
}
