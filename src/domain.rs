use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CurateError;

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9]+)-([A-Za-z0-9]+)$").unwrap());
static SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    pub key: String,
    pub value: String,
}

/// A BIDS-style filename: `key-value[_key-value...]_suffix.ext`.
///
/// The extension is everything after the first dot, so `nii.gz` is kept
/// whole. Entity order is preserved on render.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BidsName {
    entities: Vec<Entity>,
    suffix: String,
    extension: String,
}

impl BidsName {
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, key: &str) -> Option<&str> {
        self.entities
            .iter()
            .find(|entity| entity.key == key)
            .map(|entity| entity.value.as_str())
    }

    pub fn has_entity(&self, key: &str) -> bool {
        self.entity(key).is_some()
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn is_image(&self) -> bool {
        matches!(self.extension.as_str(), "nii.gz" | "nii")
    }

    pub fn acq_starts_with(&self, prefix: &str) -> bool {
        self.entity("acq")
            .map(|acq| acq.starts_with(prefix))
            .unwrap_or(false)
    }

    /// Sets `key` to `value`. An existing entity keeps its position; a new one
    /// goes last, immediately before the suffix.
    pub fn with_entity(&self, key: &str, value: &str) -> Self {
        let mut next = self.clone();
        match next.entities.iter_mut().find(|entity| entity.key == key) {
            Some(entity) => entity.value = value.to_string(),
            None => next.entities.push(Entity {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
        next
    }

    pub fn without_entity(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.entities.retain(|entity| entity.key != key);
        next
    }

    pub fn with_suffix(&self, suffix: &str) -> Self {
        let mut next = self.clone();
        next.suffix = suffix.to_string();
        next
    }

    pub fn with_extension(&self, extension: &str) -> Self {
        let mut next = self.clone();
        next.extension = extension.to_string();
        next
    }
}

impl fmt::Display for BidsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entity in &self.entities {
            write!(f, "{}-{}_", entity.key, entity.value)?;
        }
        write!(f, "{}", self.suffix)?;
        if !self.extension.is_empty() {
            write!(f, ".{}", self.extension)?;
        }
        Ok(())
    }
}

impl FromStr for BidsName {
    type Err = CurateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (stem, extension) = match value.split_once('.') {
            Some((stem, ext)) => (stem, ext),
            None => (value, ""),
        };

        let mut parts = stem.split('_').collect::<Vec<_>>();
        let suffix = parts
            .pop()
            .filter(|suffix| SUFFIX_RE.is_match(suffix))
            .ok_or_else(|| CurateError::InvalidFilename(value.to_string()))?;
        if parts.is_empty() {
            return Err(CurateError::InvalidFilename(value.to_string()));
        }

        let entities = parts
            .into_iter()
            .map(|part| {
                let caps = ENTITY_RE
                    .captures(part)
                    .ok_or_else(|| CurateError::InvalidFilename(value.to_string()))?;
                Ok(Entity {
                    key: caps[1].to_string(),
                    value: caps[2].to_string(),
                })
            })
            .collect::<Result<Vec<_>, CurateError>>()?;

        Ok(Self {
            entities,
            suffix: suffix.to_string(),
            extension: extension.to_string(),
        })
    }
}
