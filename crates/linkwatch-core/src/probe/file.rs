// # File Probe
//
// Reads a link's "observed address" from a local file. Used for
// deterministic testing and for simulating link changes by hand.
//
// ## File Format
//
// UTF-8 text whose first line is either a literal address or the text
// `None` (link unreachable):
//
// ```text
// 203.0.113.5
// ```
//
// A missing or unreadable file counts as unreachable, since the file may
// legitimately not exist yet while the system starts.

use async_trait::async_trait;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ProbeType;
use crate::error::{Error, Result};
use crate::traits::{Probe, ProbeError, ProbeFactory, ProbeSpec};

/// Sentinel first line meaning "no address"
const UNREACHABLE_SENTINEL: &str = "None";

/// Probe that reads an address from a file
#[derive(Debug, Clone)]
pub struct FileProbe {
    path: PathBuf,
    target: String,
}

impl FileProbe {
    /// Create a file probe for `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let target = path.display().to_string();
        Self { path, target }
    }
}

#[async_trait]
impl Probe for FileProbe {
    async fn observe(&self, _timeout: Duration) -> std::result::Result<IpAddr, ProbeError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ProbeError::Io(format!("{}: {}", self.target, e)))?;

        parse_probe_file(&contents)
    }

    fn probe_type(&self) -> ProbeType {
        ProbeType::File
    }

    fn target(&self) -> &str {
        &self.target
    }
}

/// Decode the contents of a probe file
pub fn parse_probe_file(contents: &str) -> std::result::Result<IpAddr, ProbeError> {
    let line = contents.lines().next().unwrap_or_default().trim();

    if line.is_empty() || line == UNREACHABLE_SENTINEL {
        return Err(ProbeError::NoAddress);
    }

    line.parse()
        .map_err(|_| ProbeError::Malformed(format!("not an address: {}", line)))
}

/// Factory for file probes
pub struct FileProbeFactory;

#[async_trait]
impl ProbeFactory for FileProbeFactory {
    async fn create(&self, spec: &ProbeSpec) -> Result<Arc<dyn Probe>> {
        if spec.target.trim().is_empty() {
            return Err(Error::config("file probe requires a path"));
        }

        // A missing file is fine (it may appear later); a directory never
        // becomes readable as a probe file.
        if let Ok(metadata) = tokio::fs::metadata(&spec.target).await
            && metadata.is_dir()
        {
            return Err(Error::config(format!(
                "file probe target {} is a directory",
                spec.target
            )));
        }

        Ok(Arc::new(FileProbe::new(&spec.target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_probe_file() {
        assert_eq!(
            parse_probe_file("203.0.113.5\n").unwrap(),
            "203.0.113.5".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            parse_probe_file("2001:db8::1\nignored\n").unwrap(),
            "2001:db8::1".parse::<IpAddr>().unwrap()
        );
        assert_eq!(parse_probe_file("None\n"), Err(ProbeError::NoAddress));
        assert_eq!(parse_probe_file(""), Err(ProbeError::NoAddress));
        assert!(matches!(
            parse_probe_file("not-an-ip"),
            Err(ProbeError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_file_probe_reads_first_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "198.51.100.7").unwrap();

        let probe = FileProbe::new(file.path());
        let ip = probe.observe(Duration::from_secs(1)).await.unwrap();
        assert_eq!(ip, "198.51.100.7".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_is_unreachable_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-yet-written");

        let spec = ProbeSpec {
            probe_type: ProbeType::File,
            target: path.display().to_string(),
            timeout: Duration::from_secs(1),
        };
        let probe = FileProbeFactory.create(&spec).await.unwrap();
        assert!(matches!(
            probe.observe(Duration::from_secs(1)).await,
            Err(ProbeError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_target_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProbeSpec {
            probe_type: ProbeType::File,
            target: dir.path().display().to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(FileProbeFactory.create(&spec).await.is_err());
    }
}
