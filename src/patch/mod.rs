pub(crate) mod model;
pub(crate) mod validate;

use crate::foundation::error::{WavepatchError, WavepatchResult};
use crate::patch::model::PatchDef;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Patch boundary object.
///
/// A snapshot of the editor's block graph. The compiler only ever reads it.
#[derive(Debug, Clone)]
pub struct Patch {
    def: PatchDef,
}

impl Patch {
    /// Parse a patch from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> WavepatchResult<Self> {
        let def: PatchDef = serde_json::from_reader(r)
            .map_err(|e| WavepatchError::serde(format!("parse patch JSON: {e}")))?;
        Ok(Self { def })
    }

    pub fn from_json_str(s: &str) -> WavepatchResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// Parse a patch from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> WavepatchResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            WavepatchError::validation(format!("open patch JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    pub fn from_def(def: PatchDef) -> Self {
        Self { def }
    }

    /// Structural validation that needs no block registry: unique ids and dangling references.
    pub fn validate(&self) -> WavepatchResult<()> {
        validate::validate_patch(&self.def).map_err(WavepatchError::Compile)
    }

    pub fn def(&self) -> &PatchDef {
        &self.def
    }

    pub fn seed(&self) -> u64 {
        self.def.seed
    }
}
