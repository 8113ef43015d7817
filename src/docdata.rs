//! Per-document data remembered between sessions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::document::Viewport;

const DOCDATA_FILENAME: &str = "docdata.json";
const APP_NAME: &str = "folio";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub path: String,
    /// Viewport in its string encoding
    pub viewport: String,
    #[serde(default)]
    pub bookmarks: Vec<usize>,
    pub last_opened: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentData {
    /// Keyed by the md5 of the document path
    documents: HashMap<String, DocumentRecord>,
    #[serde(skip)]
    file_path: Option<PathBuf>,
}

fn document_key(path: &Path) -> String {
    format!("{:x}", md5::compute(path.to_string_lossy().as_bytes()))
}

impl DocumentData {
    pub fn ephemeral() -> Self {
        Self {
            documents: HashMap::new(),
            file_path: None,
        }
    }

    pub fn with_file(file_path: &Path) -> Self {
        Self {
            documents: HashMap::new(),
            file_path: Some(file_path.to_path_buf()),
        }
    }

    /// Default location under the user's data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join(APP_NAME).join(DOCDATA_FILENAME))
    }

    pub fn load_or_ephemeral(file_path: Option<&Path>) -> Self {
        match file_path {
            Some(path) => Self::load_from_file(path).unwrap_or_else(|e| {
                log::error!("Failed to load document data from {}: {}", path.display(), e);
                Self::with_file(path)
            }),
            None => Self::ephemeral(),
        }
    }

    pub fn load_from_file(file_path: &Path) -> anyhow::Result<Self> {
        if file_path.exists() {
            let content = fs::read_to_string(file_path)?;
            let mut data: Self = serde_json::from_str(&content)?;
            data.file_path = Some(file_path.to_path_buf());
            Ok(data)
        } else {
            Ok(Self::with_file(file_path))
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Last viewport of a document, if remembered and still decodable
    pub fn viewport(&self, document: &Path) -> Option<Viewport> {
        let record = self.documents.get(&document_key(document))?;
        match Viewport::decode(&record.viewport) {
            Ok(vp) => Some(vp),
            Err(e) => {
                log::warn!("Discarding stored viewport {:?}: {e}", record.viewport);
                None
            }
        }
    }

    pub fn record(&self, document: &Path) -> Option<&DocumentRecord> {
        self.documents.get(&document_key(document))
    }

    /// Bookmarked pages of a document
    pub fn bookmarks(&self, document: &Path) -> Vec<usize> {
        self.record(document)
            .map(|r| r.bookmarks.clone())
            .unwrap_or_default()
    }

    pub fn remember(&mut self, document: &Path, viewport: &Viewport, bookmarks: &[usize]) {
        self.documents.insert(
            document_key(document),
            DocumentRecord {
                path: document.to_string_lossy().into_owned(),
                viewport: viewport.encode(),
                bookmarks: bookmarks.to_vec(),
                last_opened: chrono::Utc::now(),
            },
        );
        if let Err(e) = self.save() {
            log::error!("Failed to save document data: {}", e);
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
