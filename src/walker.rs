use crate::error::ConfigError;
use crate::frontend::FrontendSet;
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

pub const IGNORE_FILE: &str = ".checkfixignore";

/// Finds the files some front-end accepts, honouring `.gitignore`,
/// `.checkfixignore` and the configured ignore globs.
pub struct SourceWalker {
    ignore: Vec<String>,
}

impl SourceWalker {
    pub fn new(ignore: &[String]) -> Self {
        Self {
            ignore: ignore.to_vec(),
        }
    }

    fn overrides(&self, root: &Path) -> Result<Override, ConfigError> {
        let mut builder = OverrideBuilder::new(root);
        for pattern in &self.ignore {
            builder
                .add(&format!("!{}", pattern))
                .map_err(|e| ConfigError::InvalidIgnore {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
        }
        builder.build().map_err(|e| ConfigError::InvalidIgnore {
            pattern: self.ignore.join(", "),
            message: e.to_string(),
        })
    }

    pub fn walk(&self, path: &Path, frontends: &FrontendSet) -> Result<Vec<PathBuf>, ConfigError> {
        if path.is_file() {
            return Ok(if frontends.accepts(path) {
                vec![path.to_path_buf()]
            } else {
                Vec::new()
            });
        }

        let mut builder = WalkBuilder::new(path);
        builder
            .standard_filters(true)
            .add_custom_ignore_filename(IGNORE_FILE)
            .overrides(self.overrides(path)?);

        let mut files: Vec<PathBuf> = builder
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map_or(false, |ft| ft.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| frontends.accepts(path))
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Unit name of `path`: relative to `root`, with `/` separators.
pub fn unit_name(root: &Path, path: &Path) -> String {
    let relative = if root.is_file() {
        path.file_name().map(Path::new).unwrap_or(path)
    } else {
        path.strip_prefix(root).unwrap_or(path)
    };
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
