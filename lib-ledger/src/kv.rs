//! Ordered key-value storage abstraction.
//!
//! The ledger only needs an ordered KV with prefix iteration, a committed
//! snapshot distinct from the working state, and a deterministic root
//! commitment per saved version. Two backends are provided:
//!
//! - [`MemKv`]: BTreeMap-backed, for tests and light use
//! - [`SledKv`]: sled-backed, the persistent backend
//!
//! `save()` promotes the working state to the committed snapshot and returns
//! `(root, version)`. Reads take a `committed` flag: query handlers and
//! mempool admission read the committed view, block execution reads the
//! working view. The root is SHA-256 over the length-prefixed working
//! entries in key order; a real merkle commitment can replace it behind the
//! same trait without touching the ledger.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use sha2::{Digest, Sha256};

use lib_types::AppHash;

use crate::errors::{KvError, KvResult};

/// Ordered key-value storage with a committed snapshot and versioned saves.
pub trait KvStore {
    /// Point lookup against the working (`committed = false`) or last-saved
    /// (`committed = true`) view.
    fn get(&self, key: &[u8], committed: bool) -> KvResult<Option<Vec<u8>>>;

    /// Write to the working view.
    fn set(&mut self, key: &[u8], value: &[u8]) -> KvResult<()>;

    /// Delete from the working view. Deleting an absent key is a no-op.
    fn delete(&mut self, key: &[u8]) -> KvResult<()>;

    fn has(&self, key: &[u8], committed: bool) -> KvResult<bool> {
        Ok(self.get(key, committed)?.is_some())
    }

    /// All entries whose key starts with `prefix`, ascending by key.
    fn scan_prefix(&self, prefix: &[u8], committed: bool) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Entries whose key starts with `prefix`, descending by key, at most
    /// `limit` of them.
    fn scan_prefix_rev(
        &self,
        prefix: &[u8],
        committed: bool,
        limit: usize,
    ) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Root commitment over the current working view.
    fn root(&self) -> KvResult<AppHash>;

    /// Version of the last save (0 if never saved).
    fn version(&self) -> u64;

    /// Promote the working view to the committed snapshot; returns the new
    /// root and version.
    fn save(&mut self) -> KvResult<(AppHash, u64)>;

    /// Delete every entry from both views. Used by re-genesis and test
    /// harnesses only, never by block processing.
    fn purge(&mut self) -> KvResult<()>;
}

/// SHA-256 over length-prefixed `(key, value)` pairs in key order.
fn hash_entries<'a, I>(entries: I) -> AppHash
where
    I: Iterator<Item = (&'a [u8], &'a [u8])>,
{
    let mut hasher = Sha256::new();
    for (k, v) in entries {
        hasher.update((k.len() as u32).to_be_bytes());
        hasher.update(k);
        hasher.update((v.len() as u32).to_be_bytes());
        hasher.update(v);
    }
    AppHash::new(hasher.finalize().into())
}

/// Exclusive upper bound for a prefix scan, if one exists.
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < 0xff {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }
    None // prefix is all 0xff bytes; scan to the end
}

// =============================================================================
// IN-MEMORY BACKEND
// =============================================================================

/// BTreeMap-backed store. The committed view is a full copy taken at save().
#[derive(Debug, Default)]
pub struct MemKv {
    working: BTreeMap<Vec<u8>, Vec<u8>>,
    committed: BTreeMap<Vec<u8>, Vec<u8>>,
    version: u64,
}

impl MemKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn view(&self, committed: bool) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        if committed {
            &self.committed
        } else {
            &self.working
        }
    }

    fn range_of<'a>(
        view: &'a BTreeMap<Vec<u8>, Vec<u8>>,
        prefix: &[u8],
    ) -> impl DoubleEndedIterator<Item = (&'a Vec<u8>, &'a Vec<u8>)> {
        let lower = Bound::Included(prefix.to_vec());
        let upper = match prefix_upper_bound(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        view.range((lower, upper))
    }
}

impl KvStore for MemKv {
    fn get(&self, key: &[u8], committed: bool) -> KvResult<Option<Vec<u8>>> {
        Ok(self.view(committed).get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.working.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> KvResult<()> {
        self.working.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8], committed: bool) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(Self::range_of(self.view(committed), prefix)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_prefix_rev(
        &self,
        prefix: &[u8],
        committed: bool,
        limit: usize,
    ) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(Self::range_of(self.view(committed), prefix)
            .rev()
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn root(&self) -> KvResult<AppHash> {
        Ok(hash_entries(
            self.working.iter().map(|(k, v)| (k.as_slice(), v.as_slice())),
        ))
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn save(&mut self) -> KvResult<(AppHash, u64)> {
        self.committed = self.working.clone();
        self.version += 1;
        Ok((self.root()?, self.version))
    }

    fn purge(&mut self) -> KvResult<()> {
        self.working.clear();
        self.committed.clear();
        Ok(())
    }
}

// =============================================================================
// SLED BACKEND
// =============================================================================

const TREE_WORKING: &str = "working";
const TREE_COMMITTED: &str = "committed";
const TREE_META: &str = "meta";
const META_VERSION: &[u8] = b"version";

/// Sled-backed store: one tree per view plus a small meta tree.
pub struct SledKv {
    db: sled::Db,
    working: sled::Tree,
    committed: sled::Tree,
    meta: sled::Tree,
    version: u64,
}

impl SledKv {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> KvResult<Self> {
        let db = sled::open(path).map_err(db_err)?;
        Self::from_db(db)
    }

    /// Open a temporary store (for testing).
    pub fn open_temporary() -> KvResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(db_err)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> KvResult<Self> {
        let working = db.open_tree(TREE_WORKING).map_err(db_err)?;
        let committed = db.open_tree(TREE_COMMITTED).map_err(db_err)?;
        let meta = db.open_tree(TREE_META).map_err(db_err)?;

        // The working tree may hold partial writes from an interrupted
        // block. Execution must restart from the last committed snapshot,
        // so rebuild the working view from it on every open.
        working.clear().map_err(db_err)?;
        for item in committed.iter() {
            let (k, v) = item.map_err(db_err)?;
            working.insert(k, v).map_err(db_err)?;
        }

        let version = match meta.get(META_VERSION).map_err(db_err)? {
            Some(raw) if raw.len() == 8 => u64::from_be_bytes(
                raw.as_ref()
                    .try_into()
                    .map_err(|_| KvError::Database("bad version encoding".into()))?,
            ),
            Some(_) => return Err(KvError::Database("bad version encoding".into())),
            None => 0,
        };
        Ok(Self {
            db,
            working,
            committed,
            meta,
            version,
        })
    }

    fn tree(&self, committed: bool) -> &sled::Tree {
        if committed {
            &self.committed
        } else {
            &self.working
        }
    }
}

fn db_err(e: sled::Error) -> KvError {
    KvError::Database(e.to_string())
}

impl KvStore for SledKv {
    fn get(&self, key: &[u8], committed: bool) -> KvResult<Option<Vec<u8>>> {
        Ok(self
            .tree(committed)
            .get(key)
            .map_err(db_err)?
            .map(|v| v.to_vec()))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.working.insert(key, value).map_err(db_err)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> KvResult<()> {
        self.working.remove(key).map_err(db_err)?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8], committed: bool) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for item in self.tree(committed).scan_prefix(prefix) {
            let (k, v) = item.map_err(db_err)?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn scan_prefix_rev(
        &self,
        prefix: &[u8],
        committed: bool,
        limit: usize,
    ) -> KvResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for item in self.tree(committed).scan_prefix(prefix).rev().take(limit) {
            let (k, v) = item.map_err(db_err)?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    fn root(&self) -> KvResult<AppHash> {
        let mut entries = Vec::new();
        for item in self.working.iter() {
            let (k, v) = item.map_err(db_err)?;
            entries.push((k.to_vec(), v.to_vec()));
        }
        Ok(hash_entries(
            entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice())),
        ))
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn save(&mut self) -> KvResult<(AppHash, u64)> {
        // Rebuild the committed tree from the working tree. Not incremental,
        // but correct; the trait is the seam for a smarter backend.
        self.committed.clear().map_err(db_err)?;
        for item in self.working.iter() {
            let (k, v) = item.map_err(db_err)?;
            self.committed.insert(k, v).map_err(db_err)?;
        }
        self.version += 1;
        self.meta
            .insert(META_VERSION, self.version.to_be_bytes().to_vec())
            .map_err(db_err)?;
        self.db.flush().map_err(db_err)?;
        Ok((self.root()?, self.version))
    }

    fn purge(&mut self) -> KvResult<()> {
        self.working.clear().map_err(db_err)?;
        self.committed.clear().map_err(db_err)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_backend<S: KvStore>(mut kv: S) {
        // working write, not visible in committed view until save
        kv.set(b"a:1", b"one").unwrap();
        assert_eq!(kv.get(b"a:1", false).unwrap(), Some(b"one".to_vec()));
        assert_eq!(kv.get(b"a:1", true).unwrap(), None);

        let (root1, v1) = kv.save().unwrap();
        assert_eq!(v1, 1);
        assert_eq!(kv.get(b"a:1", true).unwrap(), Some(b"one".to_vec()));

        // deterministic root: same content, same hash
        assert_eq!(kv.root().unwrap(), root1);

        // prefix scans, both directions
        kv.set(b"a:2", b"two").unwrap();
        kv.set(b"a:3", b"three").unwrap();
        kv.set(b"b:1", b"other").unwrap();

        let asc = kv.scan_prefix(b"a:", false).unwrap();
        assert_eq!(asc.len(), 3);
        assert_eq!(asc[0].0, b"a:1");
        assert_eq!(asc[2].0, b"a:3");

        let desc = kv.scan_prefix_rev(b"a:", false, 2).unwrap();
        assert_eq!(desc.len(), 2);
        assert_eq!(desc[0].0, b"a:3");
        assert_eq!(desc[1].0, b"a:2");

        // committed view still sees only the first save
        assert_eq!(kv.scan_prefix(b"a:", true).unwrap().len(), 1);

        let (root2, v2) = kv.save().unwrap();
        assert_eq!(v2, 2);
        assert_ne!(root1, root2);

        // delete and purge
        kv.delete(b"a:2").unwrap();
        assert_eq!(kv.get(b"a:2", false).unwrap(), None);
        kv.purge().unwrap();
        assert!(kv.scan_prefix(b"", false).unwrap().is_empty());
        assert!(kv.scan_prefix(b"", true).unwrap().is_empty());
    }

    #[test]
    fn test_mem_backend() {
        exercise_backend(MemKv::new());
    }

    #[test]
    fn test_sled_backend() {
        exercise_backend(SledKv::open_temporary().unwrap());
    }

    #[test]
    fn test_backends_agree_on_root() {
        let mut mem = MemKv::new();
        let mut sled = SledKv::open_temporary().unwrap();
        for (k, v) in [(b"k1" as &[u8], b"v1" as &[u8]), (b"k2", b"v2")] {
            mem.set(k, v).unwrap();
            sled.set(k, v).unwrap();
        }
        assert_eq!(mem.root().unwrap(), sled.root().unwrap());
    }

    #[test]
    fn test_sled_version_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut kv = SledKv::open(dir.path()).unwrap();
            kv.set(b"k", b"v").unwrap();
            let (_, v) = kv.save().unwrap();
            assert_eq!(v, 1);
        }
        let kv = SledKv::open(dir.path()).unwrap();
        assert_eq!(kv.version(), 1);
        assert_eq!(kv.get(b"k", true).unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_sled_reopen_discards_unsaved_working_writes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut kv = SledKv::open(dir.path()).unwrap();
            kv.set(b"k", b"saved").unwrap();
            kv.save().unwrap();
            // writes of a block that never reached save()
            kv.set(b"k", b"dirty").unwrap();
            kv.set(b"extra", b"dirty").unwrap();
        }
        let kv = SledKv::open(dir.path()).unwrap();
        // the working view restarts from the committed snapshot
        assert_eq!(kv.get(b"k", false).unwrap(), Some(b"saved".to_vec()));
        assert_eq!(kv.get(b"extra", false).unwrap(), None);
        assert_eq!(kv.get(b"k", true).unwrap(), Some(b"saved".to_vec()));
    }

    #[test]
    fn test_prefix_upper_bound_edge_cases() {
        assert_eq!(prefix_upper_bound(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_upper_bound(&[0x01, 0xff]), Some(vec![0x02]));
        assert_eq!(prefix_upper_bound(&[0xff, 0xff]), None);
    }
}
