//! Filesystem repository for artefact envelopes, one `<name>.json` per artefact.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::common::config::AppCfg;
use crate::common::error::{FleetError, FleetResult};

use super::domain::{ArtifactEnvelope, ArtifactRepo};

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(cfg: &AppCfg) -> Self {
        Self::at(&cfg.models_dir)
    }

    pub fn at(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    fn check_name(name: &str) -> FleetResult<()> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(())
        } else {
            Err(FleetError::invalid(format!("illegal artifact name '{name}'")))
        }
    }
}

impl ArtifactRepo for FsArtifactStore {
    /// Write through a temporary file so readers never observe a partial artefact.
    fn put(&self, envelope: &ArtifactEnvelope) -> FleetResult<()> {
        Self::check_name(&envelope.name)?;
        fs::create_dir_all(&self.root)?;

        let path = self.path_for(&envelope.name);
        let tmp = self.root.join(format!(".{}.json.tmp", envelope.name));
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer(&mut file, envelope)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!(ev = "artifact.put", name = %envelope.name, path = %path.display());
        Ok(())
    }

    fn get(&self, name: &str) -> FleetResult<ArtifactEnvelope> {
        Self::check_name(name).map_err(|err| FleetError::artifact(name, err))?;
        let path = self.path_for(name);
        let text = fs::read_to_string(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => {
                FleetError::artifact(name, format!("not found at {}", path.display()))
            }
            _ => FleetError::artifact(name, err),
        })?;

        let envelope: ArtifactEnvelope = serde_json::from_str(&text)
            .map_err(|err| FleetError::artifact(name, format!("malformed envelope: {err}")))?;
        if envelope.name != name {
            return Err(FleetError::artifact(
                name,
                format!("file holds artifact '{}'", envelope.name),
            ));
        }
        envelope.verify()?;

        debug!(ev = "artifact.get", name, kind = ?envelope.kind);
        Ok(envelope)
    }
}
