// billing-backend/src/catalog/loader.rs

use super::versioned::{StandaloneCatalog, VersionedCatalog};
use super::xml::parse_catalog;
use crate::error::CatalogError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// カタログ1ファイルあたりの最大サイズ
pub const MAX_CATALOG_FILE_SIZE: usize = 4 * 1024 * 1024;

/// 指定された場所からバージョン付きカタログを読み込むローダー
pub trait CatalogLoader: Send + Sync {
    /// `location` はファイル、またはバージョンごとのファイルを含むディレクトリ
    fn load(&self, location: &Path) -> Result<VersionedCatalog, CatalogError>;
}

/// XML形式のカタログローダー
///
/// ディレクトリが指定された場合は直下の `*.xml` を全て1つのバージョン付き
/// カタログとして読み込む（ファイル名順、サブディレクトリは見ない）。
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCatalogLoader;

impl XmlCatalogLoader {
    pub fn new() -> Self {
        Self
    }

    /// 単一のXML文書を読み込む（主にテスト用）
    pub fn load_str(&self, content: &str) -> Result<VersionedCatalog, CatalogError> {
        VersionedCatalog::new(vec![parse_catalog(content)?])
    }

    fn load_file(&self, path: &Path) -> Result<StandaloneCatalog, CatalogError> {
        let io_error = |err: std::io::Error| CatalogError::Io(format!("{}: {}", path.display(), err));

        // 読み込む前にサイズを確認する
        let size = fs::metadata(path).map_err(io_error)?.len();
        if size > MAX_CATALOG_FILE_SIZE as u64 {
            return Err(CatalogError::Io(format!(
                "{}: catalog file exceeds size limit",
                path.display()
            )));
        }
        let bytes = fs::read(path).map_err(io_error)?;
        let content = std::str::from_utf8(&bytes).map_err(|_| {
            CatalogError::Parse(format!("{}: catalog file must be utf-8", path.display()))
        })?;

        let catalog = parse_catalog(content).map_err(|err| with_path(err, path))?;
        debug!(
            path = %path.display(),
            catalog_name = %catalog.catalog_name,
            effective_date = %catalog.effective_date,
            plans = catalog.plans.len(),
            "Catalog version parsed"
        );
        Ok(catalog)
    }

    fn catalog_files(&self, dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
        let entries = fs::read_dir(dir)
            .map_err(|err| CatalogError::Io(format!("{}: {}", dir.display(), err)))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| CatalogError::Io(format!("{}: {}", dir.display(), err)))?
                .path();
            let is_xml = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
            if path.is_file() && is_xml {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(CatalogError::Validation(vec![format!(
                "{}: no catalog files found",
                dir.display()
            )]));
        }
        Ok(files)
    }
}

impl CatalogLoader for XmlCatalogLoader {
    fn load(&self, location: &Path) -> Result<VersionedCatalog, CatalogError> {
        let files = if location.is_dir() {
            self.catalog_files(location)?
        } else {
            vec![location.to_path_buf()]
        };

        // Io / Parse は即座に返し、整合性エラーは全ファイル分をまとめて返す
        let mut versions = Vec::with_capacity(files.len());
        let mut problems = Vec::new();
        for path in &files {
            match self.load_file(path) {
                Ok(version) => versions.push(version),
                Err(CatalogError::Validation(mut errors)) => problems.append(&mut errors),
                Err(err) => return Err(err),
            }
        }
        if !problems.is_empty() {
            return Err(CatalogError::Validation(problems));
        }
        let catalog = VersionedCatalog::new(versions)?;

        info!(
            location = %location.display(),
            catalog_name = %catalog.catalog_name(),
            versions = catalog.versions().len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }
}

fn with_path(err: CatalogError, path: &Path) -> CatalogError {
    match err {
        CatalogError::Parse(message) => {
            CatalogError::Parse(format!("{}: {}", path.display(), message))
        }
        CatalogError::Validation(errors) => CatalogError::Validation(
            errors
                .into_iter()
                .map(|message| format!("{}: {}", path.display(), message))
                .collect(),
        ),
        other => other,
    }
}
