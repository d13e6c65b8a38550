//! Field values at the three locale/version granularities.

use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

use uuid::Uuid;

use crate::errors::{BlobError, ModelError};

/// Well-known statistics field ids, regenerated by every sync.
pub mod well_known {
    use uuid::Uuid;

    pub const REVISION: Uuid = Uuid::from_u128(0x8cdc337e_a112_42fb_bbb4_4143751e123f);
    pub const CREATED: Uuid = Uuid::from_u128(0x25bed78c_4957_4165_998a_ca1b52f67497);
    pub const CREATED_BY: Uuid = Uuid::from_u128(0x5dd74568_4d4b_44c1_b513_0af5f4cda34f);
    pub const UPDATED: Uuid = Uuid::from_u128(0xd9cf14b1_fa16_4ba6_9288_e8a174d4d522);
    pub const UPDATED_BY: Uuid = Uuid::from_u128(0xbadd9cf9_53e0_4d0c_bcc0_2d784c282f6a);
}

// ---------------------------------------------------------------------------
// Binary payloads
// ---------------------------------------------------------------------------

/// A readable binary payload.
pub type BlobReader = Box<dyn Read + Send>;

/// Lazy binary payload: every call to [`BlobSource::open`] produces a fresh
/// reader, so the payload can be consumed more than once.
#[derive(Clone)]
pub struct BlobSource(Arc<dyn Fn() -> Result<BlobReader, BlobError> + Send + Sync>);

impl BlobSource {
    /// Wrap a reader factory.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<BlobReader, BlobError> + Send + Sync + 'static,
    {
        Self(Arc::new(factory))
    }

    /// A payload backed by an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes: Arc<[u8]> = bytes.into();
        Self::new(move || Ok(Box::new(Cursor::new(bytes.to_vec())) as BlobReader))
    }

    /// Open a fresh reader over the payload.
    pub fn open(&self) -> Result<BlobReader, BlobError> {
        (self.0)()
    }

    /// Open and fully read the payload.
    pub fn read_all(&self) -> Result<Vec<u8>, BlobError> {
        let mut reader = self.open()?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for BlobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlobSource(..)")
    }
}

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

/// Create/update gate attached to a field.
///
/// A gated field is written only when the gate matching the item's outcome
/// is set. A gate with neither flag set behaves like no gate at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldGate {
    pub applies_on_create: bool,
    pub applies_on_update: bool,
}

impl FieldGate {
    pub const ON_CREATE: FieldGate = FieldGate {
        applies_on_create: true,
        applies_on_update: false,
    };
    pub const ON_UPDATE: FieldGate = FieldGate {
        applies_on_create: false,
        applies_on_update: true,
    };
    pub const ON_CREATE_OR_UPDATE: FieldGate = FieldGate {
        applies_on_create: true,
        applies_on_update: true,
    };

    /// Whether a field with this gate is written for an item that was
    /// `created` (true) or updated (false).
    pub fn applies(&self, created: bool) -> bool {
        if !self.applies_on_create && !self.applies_on_update {
            return true;
        }
        if created {
            self.applies_on_create
        } else {
            self.applies_on_update
        }
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// Payload common to every field variant.
#[derive(Debug)]
pub struct FieldData {
    pub id: Uuid,
    pub value: String,
    pub blob: Option<BlobSource>,
    pub is_blob: bool,
    pub name: Option<String>,
    pub gate: Option<FieldGate>,
}

impl FieldData {
    pub fn new(id: Uuid, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
            blob: None,
            is_blob: false,
            name: None,
            gate: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_gate(mut self, gate: FieldGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Mark the field as binary, with `value` holding the blob id.
    pub fn with_blob(mut self, blob: BlobSource) -> Self {
        self.blob = Some(blob);
        self.is_blob = true;
        self
    }

    fn copy(&self) -> Self {
        Self {
            id: self.id,
            value: self.value.clone(),
            blob: self.blob.clone(),
            is_blob: self.is_blob,
            name: self.name.clone(),
            gate: self.gate,
        }
    }
}

/// Scope of a field key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldScope {
    Shared,
    Unversioned,
    Versioned,
}

impl FieldScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Unversioned => "unversioned",
            Self::Versioned => "versioned",
        }
    }
}

impl std::fmt::Display for FieldScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a field within one item.
///
/// Shared fields carry an empty language and version 0; unversioned fields
/// carry version 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub scope: FieldScope,
    pub field_id: Uuid,
    pub language: String,
    pub version: u32,
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.scope {
            FieldScope::Shared => write!(f, "shared:{}", self.field_id),
            FieldScope::Unversioned => write!(f, "unversioned:{}:{}", self.field_id, self.language),
            FieldScope::Versioned => write!(
                f,
                "versioned:{}:{}#{}",
                self.field_id, self.language, self.version
            ),
        }
    }
}

/// A field value at one of three granularities.
#[derive(Debug)]
pub enum Field {
    /// One value for the whole item.
    Shared(FieldData),
    /// One value per language, shared by all versions of that language.
    Unversioned { language: String, data: FieldData },
    /// One value per (language, version).
    Versioned {
        language: String,
        version: u32,
        data: FieldData,
    },
}

impl Field {
    pub fn shared(data: FieldData) -> Self {
        Field::Shared(data)
    }

    pub fn unversioned(language: impl Into<String>, data: FieldData) -> Result<Self, ModelError> {
        let language = require_language(language.into())?;
        Ok(Field::Unversioned { language, data })
    }

    pub fn versioned(
        language: impl Into<String>,
        version: u32,
        data: FieldData,
    ) -> Result<Self, ModelError> {
        let language = require_language(language.into())?;
        if version == 0 {
            return Err(ModelError::InvalidArgument {
                argument: "version",
                detail: "version numbers start at 1".into(),
            });
        }
        Ok(Field::Versioned {
            language,
            version,
            data,
        })
    }

    pub fn data(&self) -> &FieldData {
        match self {
            Field::Shared(data) => data,
            Field::Unversioned { data, .. } => data,
            Field::Versioned { data, .. } => data,
        }
    }

    pub fn data_mut(&mut self) -> &mut FieldData {
        match self {
            Field::Shared(data) => data,
            Field::Unversioned { data, .. } => data,
            Field::Versioned { data, .. } => data,
        }
    }

    pub fn id(&self) -> Uuid {
        self.data().id
    }

    pub fn value(&self) -> &str {
        &self.data().value
    }

    pub fn language(&self) -> Option<&str> {
        match self {
            Field::Shared(_) => None,
            Field::Unversioned { language, .. } | Field::Versioned { language, .. } => {
                Some(language.as_str())
            }
        }
    }

    pub fn version(&self) -> Option<u32> {
        match self {
            Field::Versioned { version, .. } => Some(*version),
            _ => None,
        }
    }

    pub fn scope(&self) -> FieldScope {
        match self {
            Field::Shared(_) => FieldScope::Shared,
            Field::Unversioned { .. } => FieldScope::Unversioned,
            Field::Versioned { .. } => FieldScope::Versioned,
        }
    }

    pub fn key(&self) -> FieldKey {
        FieldKey {
            scope: self.scope(),
            field_id: self.id(),
            language: self.language().unwrap_or_default().to_string(),
            version: self.version().unwrap_or(0),
        }
    }

    /// Variant-preserving deep copy.
    pub fn copy(&self) -> Field {
        match self {
            Field::Shared(data) => Field::Shared(data.copy()),
            Field::Unversioned { language, data } => Field::Unversioned {
                language: language.clone(),
                data: data.copy(),
            },
            Field::Versioned {
                language,
                version,
                data,
            } => Field::Versioned {
                language: language.clone(),
                version: *version,
                data: data.copy(),
            },
        }
    }
}

impl Clone for Field {
    fn clone(&self) -> Self {
        self.copy()
    }
}

fn require_language(language: String) -> Result<String, ModelError> {
    if language.trim().is_empty() {
        return Err(ModelError::InvalidArgument {
            argument: "language",
            detail: "language-scoped fields need a non-empty language".into(),
        });
    }
    Ok(language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unversioned_requires_language() {
        let result = Field::unversioned("", FieldData::new(Uuid::new_v4(), "x"));
        assert!(matches!(
            result,
            Err(ModelError::InvalidArgument { argument: "language", .. })
        ));
    }

    #[test]
    fn test_versioned_rejects_version_zero() {
        let result = Field::versioned("en", 0, FieldData::new(Uuid::new_v4(), "x"));
        assert!(matches!(
            result,
            Err(ModelError::InvalidArgument { argument: "version", .. })
        ));
    }

    #[test]
    fn test_keys_distinguish_variants() {
        let id = Uuid::new_v4();
        let shared = Field::shared(FieldData::new(id, "a"));
        let unversioned = Field::unversioned("en", FieldData::new(id, "a")).unwrap();
        let versioned = Field::versioned("en", 1, FieldData::new(id, "a")).unwrap();
        assert_ne!(shared.key(), unversioned.key());
        assert_ne!(unversioned.key(), versioned.key());
        assert_eq!(versioned.key().version, 1);
        assert_eq!(shared.key().language, "");
    }

    #[test]
    fn test_copy_preserves_variant_and_is_independent() {
        let original = Field::versioned(
            "da",
            3,
            FieldData::new(Uuid::new_v4(), "hej").with_gate(FieldGate::ON_CREATE),
        )
        .unwrap();
        let mut copy = original.copy();
        copy.data_mut().value = "changed".into();

        assert_eq!(original.value(), "hej");
        assert_eq!(copy.scope(), FieldScope::Versioned);
        assert_eq!(copy.version(), Some(3));
        assert_eq!(copy.data().gate, Some(FieldGate::ON_CREATE));
    }

    #[test]
    fn test_blob_source_opens_fresh_readers() {
        let blob = BlobSource::from_bytes(b"payload".to_vec());
        assert_eq!(blob.read_all().unwrap(), b"payload");
        assert_eq!(blob.read_all().unwrap(), b"payload");
    }

    #[test]
    fn test_gate_applies() {
        assert!(FieldGate::default().applies(true));
        assert!(FieldGate::default().applies(false));
        assert!(FieldGate::ON_CREATE.applies(true));
        assert!(!FieldGate::ON_CREATE.applies(false));
        assert!(!FieldGate::ON_UPDATE.applies(true));
        assert!(FieldGate::ON_UPDATE.applies(false));
        assert!(FieldGate::ON_CREATE_OR_UPDATE.applies(false));
    }
}
