use super::{KeyPath, Store, StoreError, StoreValue};
use crate::model::types::OwnerId;

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DOCUMENT_NAME: &str = "store.json";

/// Serialized form of one owner's tree: `key path -> value name -> value`.
type Document = BTreeMap<String, BTreeMap<String, StoreValue>>;

/// Store backed by one JSON document per owner.
///
/// Layout: `<root>/<owner>/store.json`. Every operation loads the document,
/// applies the change and writes it back through a temporary file and a
/// rename, so readers never observe a half-written document.
pub struct FileStore {
    root: PathBuf,
    io_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            io_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `owner`'s document.
    pub fn owner_dir(&self, owner: &OwnerId) -> PathBuf {
        owner_dir(&self.root, owner)
    }

    fn document_path(&self, owner: &OwnerId) -> PathBuf {
        self.owner_dir(owner).join(DOCUMENT_NAME)
    }

    fn load(&self, owner: &OwnerId) -> Result<Document, StoreError> {
        match fs::read(self.document_path(owner)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, owner: &OwnerId, document: &Document) -> Result<(), StoreError> {
        let dir = self.owner_dir(owner);
        fs::create_dir_all(&dir)?;
        let path = dir.join(DOCUMENT_NAME);
        let tmp = dir.join(format!("{}.tmp", DOCUMENT_NAME));
        fs::write(&tmp, serde_json::to_vec_pretty(document)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn read<T>(&self, owner: &OwnerId, f: impl FnOnce(&Document) -> T) -> Result<T, StoreError> {
        let _guard = self.io_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let document = self.load(owner)?;
        Ok(f(&document))
    }

    /// Applies `f` and persists the document when it reports a change.
    fn update(
        &self,
        owner: &OwnerId,
        f: impl FnOnce(&mut Document) -> bool,
    ) -> Result<(), StoreError> {
        let _guard = self.io_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut document = self.load(owner)?;
        if f(&mut document) {
            self.save(owner, &document)?;
        }
        Ok(())
    }
}

/// Maps an owner id onto a directory name.
///
/// `[A-Za-z0-9-]` is kept as is and every other byte becomes `_XX` (upper hex),
/// so distinct owners never share a directory. An empty id maps to `_`.
pub fn owner_dir(root: &Path, owner: &OwnerId) -> PathBuf {
    let id = owner.as_str();
    if id.is_empty() {
        return root.join("_");
    }

    let mut name = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("_{:02X}", byte));
        }
    }
    root.join(name)
}

fn create_with_ancestors(document: &mut Document, key: &KeyPath) -> bool {
    let mut created = false;
    let mut current = Some(key.clone());
    while let Some(path) = current {
        if path.segments().is_empty() {
            break;
        }
        current = path.parent();
        let name = path.to_string();
        if !document.contains_key(&name) {
            document.insert(name, BTreeMap::new());
            created = true;
        }
    }
    created
}

fn is_within(candidate: &str, key: &str) -> bool {
    candidate == key || is_below(candidate, key)
}

fn is_below(candidate: &str, key: &str) -> bool {
    candidate.len() > key.len() && candidate.starts_with(key) && candidate[key.len()..].starts_with('/')
}

impl Store for FileStore {
    fn create_key(&self, owner: &OwnerId, key: &KeyPath) -> Result<(), StoreError> {
        self.update(owner, |document| create_with_ancestors(document, key))
    }

    fn key_exists(&self, owner: &OwnerId, key: &KeyPath) -> Result<bool, StoreError> {
        let name = key.to_string();
        self.read(owner, |document| document.contains_key(&name))
    }

    fn read_value(
        &self,
        owner: &OwnerId,
        key: &KeyPath,
        name: &str,
    ) -> Result<Option<StoreValue>, StoreError> {
        let path = key.to_string();
        self.read(owner, |document| {
            document
                .get(&path)
                .and_then(|values| values.get(name))
                .cloned()
        })
    }

    fn write_value(
        &self,
        owner: &OwnerId,
        key: &KeyPath,
        name: &str,
        value: StoreValue,
    ) -> Result<(), StoreError> {
        let path = key.to_string();
        self.update(owner, |document| {
            create_with_ancestors(document, key);
            document
                .entry(path)
                .or_default()
                .insert(name.to_string(), value);
            true
        })
    }

    fn delete_value(&self, owner: &OwnerId, key: &KeyPath, name: &str) -> Result<(), StoreError> {
        let path = key.to_string();
        self.update(owner, |document| {
            document
                .get_mut(&path)
                .map(|values| values.remove(name).is_some())
                .unwrap_or(false)
        })
    }

    fn enumerate_values(
        &self,
        owner: &OwnerId,
        key: &KeyPath,
    ) -> Result<Option<Vec<(String, StoreValue)>>, StoreError> {
        let path = key.to_string();
        self.read(owner, |document| {
            document.get(&path).map(|values| {
                values
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
        })
    }

    fn delete_key(&self, owner: &OwnerId, key: &KeyPath) -> Result<(), StoreError> {
        let path = key.to_string();
        self.update(owner, |document| {
            let before = document.len();
            document.retain(|name, _| !is_within(name, &path));
            document.len() != before
        })
    }

    fn delete_key_if_empty(&self, owner: &OwnerId, key: &KeyPath) -> Result<(), StoreError> {
        let path = key.to_string();
        self.update(owner, |document| {
            match document.get(&path) {
                Some(values) if values.is_empty() => {}
                _ => return false,
            }
            if document.keys().any(|name| is_below(name, &path)) {
                return false;
            }
            document.remove(&path);
            true
        })
    }
}
