//! The package record and its constituent value types (`spec.md` §3).

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::version::{Revision, Tag, Version};

/// `category/name`, the identity of a package modulo version and slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    pub category: String,
    pub name: String,
}

impl Key {
    /// Parses `category/name`.
    pub fn parse(input: &str) -> Result<Self, Error> {
        match input.split_once('/') {
            Some((category, name)) if !category.is_empty() && !name.is_empty() => Ok(Key {
                category: category.to_string(),
                name: name.to_string(),
            }),
            _ => Err(Error::InvalidKey(input.to_string())),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.name)
    }
}

/// A parallel-installability token (`:slot`); different slots of the same [`Key`] may
/// coexist installed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot(pub String);

impl Slot {
    /// The implicit default slot used when an atom names no slot.
    pub fn default_slot() -> Self {
        Slot("0".to_string())
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::default_slot()
    }
}

/// A release channel; each installed registry has one active branch (`spec.md` GLOSSARY).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Branch(pub String);

/// A unique package identifier within one repository snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageId(pub u64);

/// A repository identifier, unique within one session's configured repository set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepositoryId(pub u32);

/// The full `(category, name, version, tag, slot, revision, branch, api)` scope of a
/// package record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub key: Key,
    #[serde(with = "version_serde")]
    pub version: Version,
    pub tag: Tag,
    pub slot: Slot,
    pub revision: Revision,
    pub branch: Branch,
    pub api: u32,
}

mod version_serde {
    use super::Version;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Version, s: S) -> Result<S::Ok, S::Error> {
        v.as_str().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Version, D::Error> {
        let s = String::deserialize(d)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A download artifact and its integrity digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub download_path: String,
    pub size: u64,
    pub on_disk_size: u64,
    pub digest_md5: String,
    pub sig_sha1: Option<String>,
    pub sig_sha256: Option<String>,
    pub sig_sha512: Option<String>,
    pub optional_gpg: Option<Vec<u8>>,
}

/// How a dependency string relates to the package that names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    Runtime,
    Build,
    Post,
    Manual,
}

/// A single dependency relation: the raw atom string plus its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub atom: String,
    pub kind: DependencyKind,
}

/// A `PROVIDE` alias, possibly marked as the "default" provider for legacy virtuals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provide {
    pub name: String,
    pub is_default: bool,
}

/// ELF word size of a `NEEDED`/provided SONAME.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

/// One ELF shared-object library name recorded for library-breakage analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Needed {
    pub soname: String,
    pub class: ElfClass,
}

/// The kind of a content entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    File,
    Dir,
    Symlink,
    Obj,
}

/// One `(path, kind)` tuple of a package's content set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentEntry {
    pub path: String,
    pub kind: ContentKind,
}

/// Pre/post install and removal hook scripts plus shipped user-visible messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hooks {
    pub preinstall: Option<Vec<u8>>,
    pub postinstall: Option<Vec<u8>>,
    pub preremove: Option<Vec<u8>>,
    pub postremove: Option<Vec<u8>>,
    pub messages: Vec<String>,
}

/// Build/runtime metadata carried by a package record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildMetadata {
    pub chost: String,
    pub cflags: String,
    pub cxxflags: String,
    pub use_enabled: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
    pub license: BTreeSet<String>,
    pub homepage: String,
    pub description: String,
}

/// An immutable package record as held within one repository snapshot (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    pub repository_id: RepositoryId,
    pub package_id: PackageId,
    pub scope: Scope,
    pub artifact: Artifact,
    pub metadata: BuildMetadata,
    pub relations: Vec<Relation>,
    pub conflicts: Vec<String>,
    pub provides: Vec<Provide>,
    pub needed: Vec<Needed>,
    pub provided_sonames: HashSet<String>,
    pub mirrors: Vec<String>,
    pub content: Vec<ContentEntry>,
    pub hooks: Hooks,
}

impl PackageRecord {
    /// The `(key, slot)` supersession identity of this record.
    pub fn key_slot(&self) -> (Key, Slot) {
        (self.scope.key.clone(), self.scope.slot.clone())
    }

    /// The `(version, tag, revision)` comparison tuple used by the resolver and the
    /// installed-vs-repository comparator.
    pub fn compare_tuple(&self) -> (&Version, &Tag, Revision) {
        (&self.scope.version, &self.scope.tag, self.scope.revision)
    }
}

/// `install_source` of an [`InstalledRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallSource {
    User,
    Dependency,
}

/// A record in the installed registry: a package record plus installation provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledRecord {
    pub record: PackageRecord,
    pub installed_from_repository_id: RepositoryId,
    pub install_source: InstallSource,
    /// `path -> md5` for config-protected files that were installed untouched.
    pub automerge_map: std::collections::BTreeMap<String, String>,
    /// Exempt from `(key, slot)` supersession.
    pub injected: bool,
    /// May not be the sole root of a removal plan unless another slot of the same key
    /// remains installed.
    pub system: bool,
    /// Forces the world-update planner to include this id even when the resolved
    /// repository candidate's revision matches what is installed (`spec.md` §4.9).
    pub replay: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_parses_category_and_name() {
        let key = Key::parse("app-editors/vim").unwrap();
        assert_eq!(key.category, "app-editors");
        assert_eq!(key.name, "vim");
    }

    #[test]
    fn key_rejects_missing_slash() {
        assert!(Key::parse("vim").is_err());
        assert!(Key::parse("/vim").is_err());
        assert!(Key::parse("app-editors/").is_err());
    }

    #[test]
    fn default_slot_is_zero() {
        assert_eq!(Slot::default(), Slot("0".to_string()));
    }
}
