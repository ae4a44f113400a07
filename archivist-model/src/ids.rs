use crate::error::{ModelError, Result};
use uuid::Uuid;

/// Stable identity of an image record.
///
/// The id is opaque and content independent: it survives renames, vault moves
/// and re-hashing, and it is the join key written into `.json` sidecars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ImageId(String);

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageId {
    pub fn new() -> Self {
        ImageId(Uuid::now_v7().simple().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ModelError::EmptyId("image"));
        }
        Ok(ImageId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ImageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a library source (vault).
///
/// `internal` is reserved for the app-managed vault and always exists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SourceId(String);

impl SourceId {
    pub const INTERNAL: &'static str = "internal";

    pub fn internal() -> Self {
        SourceId(Self::INTERNAL.to_string())
    }

    /// Fresh id for a newly linked folder.
    pub fn new_linked() -> Self {
        SourceId(format!("src_{}", Uuid::now_v7().simple()))
    }

    pub fn from_string(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ModelError::EmptyId("source"));
        }
        Ok(SourceId(id))
    }

    pub fn is_internal(&self) -> bool {
        self.0 == Self::INTERNAL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::internal()
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ids_are_rejected() {
        assert!(ImageId::from_string("  ").is_err());
        assert!(SourceId::from_string("").is_err());
    }

    #[test]
    fn internal_source_is_recognised() {
        assert!(SourceId::internal().is_internal());
        assert!(SourceId::default().is_internal());
        assert!(!SourceId::new_linked().is_internal());
    }

    #[test]
    fn generated_image_ids_are_unique() {
        assert_ne!(ImageId::new(), ImageId::new());
    }
}
