//! JSON-file persistence for the in-memory store.
//!
//! A collection file holds one JSON array of documents. Loading replaces
//! nothing on disk; saving writes a sibling temporary file and renames it
//! over the target so a crash never leaves a half-written collection.

use crate::backend::Document;
use crate::error::{StorageError, StorageResult};
use crate::memory::InMemoryStore;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

impl InMemoryStore {
    /// Loads a collection file, or returns an empty store if the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a JSON array
    /// of objects, or holds an invalid identity.
    pub fn open(path: &Path, identity_field: &str) -> StorageResult<Self> {
        if !path.exists() {
            debug!("collection file {:?} not found, starting empty", path);
            return Ok(Self::with_identity_field(identity_field));
        }
        let documents = read_documents(path)?;
        debug!("loaded {} documents from {:?}", documents.len(), path);
        Self::with_documents(identity_field, documents)
    }

    /// Writes every document to `path` as a JSON array.
    ///
    /// Parent directories are created if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let documents = self.documents();
        let staging = staging_path(path);
        {
            let mut writer = BufWriter::new(File::create(&staging)?);
            serde_json::to_writer_pretty(&mut writer, &documents)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&staging, path)?;
        debug!("saved {} documents to {:?}", documents.len(), path);
        Ok(())
    }
}

/// Reads a JSON array of documents from `path`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidDocument`] if the top level is not an
/// array or an element is not an object.
pub fn read_documents(path: &Path) -> StorageResult<Vec<Document>> {
    let value: Value = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    let Value::Array(items) = value else {
        return Err(StorageError::invalid_document(format!(
            "{} does not contain a JSON array",
            path.display()
        )));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(document) => Ok(document),
            _ => Err(StorageError::invalid_document(format!(
                "element {index} of {} is not an object",
                path.display()
            ))),
        })
        .collect()
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
