use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use cumulus_core::StudioSettings;

use crate::DecompileError;

/// Turns ARM template JSON into Bicep source.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn decompile(&self, template_json: &str) -> Result<String, DecompileError>;
}

/// Runs the `bicep` CLI: `bicep decompile --stdout <file>`.
pub struct BicepCli {
    binary: Option<PathBuf>,
}

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

impl BicepCli {
    /// `binary` overrides the PATH lookup.
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self { binary }
    }

    pub fn from_settings(settings: &StudioSettings) -> Self {
        Self::new(settings.bicep_path.as_ref().map(PathBuf::from))
    }

    fn resolve(&self) -> Result<PathBuf, DecompileError> {
        match &self.binary {
            Some(path) => Ok(path.clone()),
            None => which::which("bicep").map_err(|e| DecompileError::NotFound(e.to_string())),
        }
    }

    fn scratch_path() -> PathBuf {
        let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("cumulus-{}-{}.json", std::process::id(), seq))
    }
}

#[async_trait]
impl Converter for BicepCli {
    async fn decompile(&self, template_json: &str) -> Result<String, DecompileError> {
        let binary = self.resolve()?;
        let scratch = Self::scratch_path();
        tokio::fs::write(&scratch, template_json)
            .await
            .map_err(|e| DecompileError::Spawn(format!("write {}: {e}", scratch.display())))?;

        tracing::debug!(binary = %binary.display(), input = %scratch.display(), "running bicep decompile");
        let output = tokio::process::Command::new(&binary)
            .arg("decompile")
            .arg("--stdout")
            .arg(&scratch)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        if let Err(e) = tokio::fs::remove_file(&scratch).await {
            tracing::debug!(path = %scratch.display(), "could not remove scratch file: {}", e);
        }

        let output = output.map_err(|e| DecompileError::Spawn(format!("{}: {e}", binary.display())))?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(DecompileError::Failed {
                code: output.status.code(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            // bicep reports decompilation warnings on stderr even on success
            tracing::warn!("bicep: {}", stderr);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_binary_skips_path_lookup() {
        let cli = BicepCli::new(Some(PathBuf::from("/opt/bicep/bicep")));
        assert_eq!(cli.resolve().unwrap(), PathBuf::from("/opt/bicep/bicep"));
    }

    #[test]
    fn settings_supply_the_binary() {
        let settings = StudioSettings {
            bicep_path: Some("/usr/local/bin/bicep".into()),
            ..Default::default()
        };
        assert_eq!(
            BicepCli::from_settings(&settings).resolve().unwrap(),
            PathBuf::from("/usr/local/bin/bicep")
        );
    }

    #[test]
    fn scratch_files_are_unique() {
        assert_ne!(BicepCli::scratch_path(), BicepCli::scratch_path());
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let cli = BicepCli::new(Some(PathBuf::from("/nonexistent/cumulus-test/bicep")));
        let err = cli.decompile("{}").await.unwrap_err();
        assert!(matches!(err, DecompileError::Spawn(_)), "{err:?}");
    }
}
