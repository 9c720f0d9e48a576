use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

use crate::domain::{AppError, RejectionKind};
use crate::ports::TemplateSource;

/// Filesystem-based template source.
///
/// A bundle name that points at an existing file is read directly; otherwise
/// `<root>/<bundle>.yml` is used.
#[derive(Debug, Clone)]
pub struct FilesystemTemplateSource {
    root: PathBuf,
}

impl FilesystemTemplateSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Template source for the current directory.
    pub fn current() -> Result<Self, AppError> {
        Ok(Self::new(std::env::current_dir()?))
    }

    fn locate(&self, bundle: &str) -> PathBuf {
        let direct = Path::new(bundle);
        if direct.is_file() {
            return direct.to_path_buf();
        }
        self.root.join(format!("{}.yml", bundle))
    }
}

impl TemplateSource for FilesystemTemplateSource {
    fn fetch_template(&self, bundle: &str, _repository: Option<&Url>) -> Result<String, AppError> {
        let path = self.locate(bundle);
        if !path.is_file() {
            return Err(AppError::rejection(
                RejectionKind::NotFound,
                format!("Bundle file not found: {}", path.display()),
            ));
        }
        Ok(fs::read_to_string(path)?)
    }
}
