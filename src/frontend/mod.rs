//! Front-ends turn files into [`ProgramUnit`]s.

mod rust;

pub use rust::RustFrontend;

use crate::error::FrontendError;
use crate::model::ProgramUnit;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Files above this size are read through a memory map.
const MMAP_THRESHOLD: u64 = 1024 * 1024;

pub trait Frontend: Send + Sync {
    fn name(&self) -> &'static str;

    fn accepts(&self, path: &Path) -> bool;

    /// Builds a unit from source text already in memory.
    fn parse(&self, name: &str, path: &Path, source: String) -> Result<ProgramUnit, FrontendError>;

    fn load(&self, name: &str, path: &Path) -> Result<ProgramUnit, FrontendError> {
        let source = read_source(path)?;
        self.parse(name, path, source)
    }
}

pub fn read_source(path: &Path) -> Result<String, FrontendError> {
    let read_err = |source| FrontendError::Read {
        path: path.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(path).map_err(read_err)?;
    if metadata.len() <= MMAP_THRESHOLD {
        return std::fs::read_to_string(path).map_err(read_err);
    }

    let file = File::open(path).map_err(read_err)?;
    // SAFETY: the map is only read for the duration of this call and copied out
    let mmap = unsafe { Mmap::map(&file) }.map_err(read_err)?;
    std::str::from_utf8(&mmap)
        .map(str::to_string)
        .map_err(|e| read_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Loads a program model serialized by an external parser (`*.unit.json`).
pub struct JsonFrontend;

impl JsonFrontend {
    pub const SUFFIX: &'static str = ".unit.json";
}

impl Frontend for JsonFrontend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn accepts(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.ends_with(Self::SUFFIX))
    }

    fn parse(&self, name: &str, path: &Path, source: String) -> Result<ProgramUnit, FrontendError> {
        let mut unit: ProgramUnit = serde_json::from_str(&source).map_err(|e| FrontendError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if unit.name.is_empty() {
            unit.name = name.trim_end_matches(Self::SUFFIX).to_string();
        }
        unit.validate().map_err(|message| FrontendError::InvalidModel {
            path: path.to_path_buf(),
            message,
        })?;

        let mut ids: Vec<usize> = unit.statements().map(|s| s.id).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(FrontendError::InvalidModel {
                path: path.to_path_buf(),
                message: format!("statement id {} is used twice", pair[0]),
            });
        }
        Ok(unit)
    }
}

/// The front-ends of a run, tried in order.
pub struct FrontendSet {
    frontends: Vec<Box<dyn Frontend>>,
}

impl FrontendSet {
    pub fn new(frontends: Vec<Box<dyn Frontend>>) -> Self {
        Self { frontends }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }

    pub fn for_path(&self, path: &Path) -> Option<&dyn Frontend> {
        self.frontends
            .iter()
            .find(|frontend| frontend.accepts(path))
            .map(|frontend| frontend.as_ref())
    }

    pub fn load(&self, name: &str, path: &Path) -> Result<ProgramUnit, FrontendError> {
        let frontend = self
            .for_path(path)
            .ok_or_else(|| FrontendError::Unsupported(path.to_path_buf()))?;
        tracing::debug!("loading {} with the {} front-end", name, frontend.name());
        frontend.load(name, path)
    }

    pub fn parse(&self, name: &str, path: &Path, source: String) -> Result<ProgramUnit, FrontendError> {
        let frontend = self
            .for_path(path)
            .ok_or_else(|| FrontendError::Unsupported(path.to_path_buf()))?;
        frontend.parse(name, path, source)
    }
}

impl Default for FrontendSet {
    fn default() -> Self {
        Self::new(vec![Box::new(JsonFrontend), Box::new(RustFrontend)])
    }
}
