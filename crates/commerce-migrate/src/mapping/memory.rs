//! In-memory mapping store with optional JSON snapshots.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ops::Bound;
use std::path::Path;

use super::{EntityType, MappingEntry, MappingStore};
use crate::error::Result;

type Key = (EntityType, String);

/// Mapping store backed by an ordered map.
///
/// Used by tests, dry runs and runs without a mapping database;
/// `save`/`load` persist it between processes.
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    entries: RwLock<BTreeMap<Key, String>>,
}

impl MemoryMappingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let entries: Vec<MappingEntry> = serde_json::from_reader(reader)?;
        let map = entries
            .into_iter()
            .map(|e| ((e.entity, e.source_id), e.target_id))
            .collect();
        Ok(Self {
            entries: RwLock::new(map),
        })
    }

    /// Loads a snapshot, or creates an empty store when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_new(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Writes every entry as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let entries: Vec<MappingEntry> = self
            .entries
            .read()
            .iter()
            .map(|((entity, source_id), target_id)| MappingEntry {
                entity: *entity,
                source_id: source_id.clone(),
                target_id: target_id.clone(),
            })
            .collect();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &entries)?;
        Ok(())
    }

    /// Total number of entries across all types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true when the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn prefixed<'m>(
        map: &'m BTreeMap<Key, String>,
        entity: EntityType,
        prefix: &str,
    ) -> impl Iterator<Item = (&'m String, &'m String)> + 'm {
        let prefix = prefix.to_string();
        map.range((Bound::Included((entity, prefix.clone())), Bound::Unbounded))
            .take_while(move |((e, source), _)| *e == entity && source.starts_with(&prefix))
            .map(|((_, source), target)| (source, target))
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn put(&self, entity: EntityType, source_id: &str, target_id: &str) -> Result<()> {
        self.entries
            .write()
            .insert((entity, source_id.to_string()), target_id.to_string());
        Ok(())
    }

    async fn get(&self, entity: EntityType, source_id: &str) -> Result<Option<String>> {
        if source_id.is_empty() {
            return Ok(None);
        }
        Ok(self
            .entries
            .read()
            .get(&(entity, source_id.to_string()))
            .cloned())
    }

    async fn get_by_prefix(&self, entity: EntityType, prefix: &str) -> Result<Option<String>> {
        if prefix.is_empty() {
            return Ok(None);
        }
        let map = self.entries.read();
        let found = Self::prefixed(&map, entity, prefix)
            .next()
            .map(|(_, target)| target.clone());
        Ok(found)
    }

    async fn find_by_id_or_prefix(
        &self,
        entity: EntityType,
        source_id: &str,
        prefix: &str,
    ) -> Result<Vec<String>> {
        let map = self.entries.read();
        let mut targets = Vec::new();
        if !source_id.is_empty() {
            if let Some(target) = map.get(&(entity, source_id.to_string())) {
                targets.push(target.clone());
            }
        }
        if !prefix.is_empty() {
            targets.extend(
                Self::prefixed(&map, entity, prefix)
                    .filter(|(source, _)| source.as_str() != source_id)
                    .map(|(_, target)| target.clone()),
            );
        }
        Ok(targets)
    }

    async fn reassign_target(
        &self,
        entity: EntityType,
        old_target: &str,
        new_target: &str,
    ) -> Result<u64> {
        let mut map = self.entries.write();
        let mut changed = 0;
        for ((e, _), target) in map.iter_mut() {
            if *e == entity && target == old_target {
                *target = new_target.to_string();
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn reset(&self, entities: &[EntityType]) -> Result<u64> {
        let mut map = self.entries.write();
        let before = map.len();
        map.retain(|(e, _), _| !entities.contains(e));
        Ok((before - map.len()) as u64)
    }

    async fn entries(&self, entity: EntityType) -> Result<Vec<MappingEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|((e, _), _)| *e == entity)
            .map(|((e, source_id), target_id)| MappingEntry {
                entity: *e,
                source_id: source_id.clone(),
                target_id: target_id.clone(),
            })
            .collect())
    }
}
