use std::{
    borrow::Borrow,
    collections::{BTreeMap, BTreeSet},
};

use serde::{Deserialize, Serialize};

use crate::DomainError;

const MAX_PERMISSION_NAME_BYTES: usize = 64;

/// Dotted capability name such as `command.master`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionName(String);

impl PermissionName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PermissionName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_permission_name(&value)?;
        Ok(Self(value))
    }
}

impl TryFrom<&str> for PermissionName {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}

impl From<PermissionName> for String {
    fn from(value: PermissionName) -> Self {
        value.0
    }
}

impl Borrow<str> for PermissionName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PermissionName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    name: PermissionName,
    default_allow: bool,
}

impl Permission {
    #[must_use]
    pub fn new(name: PermissionName, default_allow: bool) -> Self {
        Self {
            name,
            default_allow,
        }
    }

    #[must_use]
    pub fn name(&self) -> &PermissionName {
        &self.name
    }

    /// Holders are allowed unless some layer explicitly denies.
    #[must_use]
    pub fn default_allow(&self) -> bool {
        self.default_allow
    }
}

/// The fixed set of known permissions. Grows add-only.
#[derive(Debug, Clone, Default)]
pub struct PermissionCatalog {
    permissions: BTreeMap<PermissionName, Permission>,
}

impl PermissionCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a list of permissions.
    ///
    /// # Errors
    /// Returns [`DomainError::DuplicatePermission`] if a name appears twice.
    pub fn from_permissions(
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Result<Self, DomainError> {
        let mut catalog = Self::new();
        for permission in permissions {
            catalog.register(permission)?;
        }
        Ok(catalog)
    }

    /// # Errors
    /// Returns [`DomainError::DuplicatePermission`] if the name is already known.
    pub fn register(&mut self, permission: Permission) -> Result<(), DomainError> {
        if self.permissions.contains_key(permission.name.as_str()) {
            return Err(DomainError::DuplicatePermission(
                permission.name.as_str().to_owned(),
            ));
        }
        self.permissions.insert(permission.name.clone(), permission);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Permission> {
        self.permissions.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.values()
    }

    /// Every permission whose name contains `needle`; an empty needle matches all.
    pub fn matching<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = &'a Permission> + 'a {
        self.permissions
            .values()
            .filter(move |permission| permission.name.as_str().contains(needle))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<PermissionName>);

impl PermissionSet {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn insert(&mut self, name: PermissionName) -> bool {
        self.0.insert(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionName> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<PermissionName> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = PermissionName>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Allowed,
    Denied,
    Unset,
}

impl PermissionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::Unset => "unset",
        }
    }
}

impl core::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allow/deny state attached to one principal.
///
/// A name is never present in both sets: every mutator removes it from the
/// opposite set first, and [`PermissionOverwrite::from_parts`] drops conflicting
/// entries from `allow`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "OverwriteParts")]
pub struct PermissionOverwrite {
    allow: PermissionSet,
    deny: PermissionSet,
}

#[derive(Deserialize)]
struct OverwriteParts {
    #[serde(default)]
    allow: PermissionSet,
    #[serde(default)]
    deny: PermissionSet,
}

impl From<OverwriteParts> for PermissionOverwrite {
    fn from(parts: OverwriteParts) -> Self {
        Self::from_parts(parts.allow, parts.deny)
    }
}

impl PermissionOverwrite {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_parts(allow: PermissionSet, deny: PermissionSet) -> Self {
        let allow = allow
            .0
            .into_iter()
            .filter(|name| !deny.contains(name.as_str()))
            .collect();
        Self { allow, deny }
    }

    #[must_use]
    pub fn allowed(&self) -> &PermissionSet {
        &self.allow
    }

    #[must_use]
    pub fn denied(&self) -> &PermissionSet {
        &self.deny
    }

    #[must_use]
    pub fn state_of(&self, name: &str) -> PermissionState {
        if self.deny.contains(name) {
            PermissionState::Denied
        } else if self.allow.contains(name) {
            PermissionState::Allowed
        } else {
            PermissionState::Unset
        }
    }

    /// Returns the state held before the call.
    pub fn allow(&mut self, name: &PermissionName) -> PermissionState {
        let previous = self.state_of(name.as_str());
        self.deny.remove(name.as_str());
        self.allow.insert(name.clone());
        previous
    }

    /// Returns the state held before the call.
    pub fn deny(&mut self, name: &PermissionName) -> PermissionState {
        let previous = self.state_of(name.as_str());
        self.allow.remove(name.as_str());
        self.deny.insert(name.clone());
        previous
    }

    /// Returns the state held before the call.
    pub fn reset(&mut self, name: &str) -> PermissionState {
        let previous = self.state_of(name);
        self.allow.remove(name);
        self.deny.remove(name);
        previous
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// A single change to one principal's overwrite, applied by the store under
/// its own write guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionEdit {
    Allow(PermissionName),
    Deny(PermissionName),
    Reset(PermissionName),
}

impl PermissionEdit {
    #[must_use]
    pub fn name(&self) -> &PermissionName {
        match self {
            Self::Allow(name) | Self::Deny(name) | Self::Reset(name) => name,
        }
    }

    /// State the edited name holds afterwards.
    #[must_use]
    pub const fn target_state(&self) -> PermissionState {
        match self {
            Self::Allow(_) => PermissionState::Allowed,
            Self::Deny(_) => PermissionState::Denied,
            Self::Reset(_) => PermissionState::Unset,
        }
    }

    /// Returns the state held before the edit.
    pub fn apply(&self, overwrite: &mut PermissionOverwrite) -> PermissionState {
        match self {
            Self::Allow(name) => overwrite.allow(name),
            Self::Deny(name) => overwrite.deny(name),
            Self::Reset(name) => overwrite.reset(name.as_str()),
        }
    }
}

fn validate_permission_name(value: &str) -> Result<(), DomainError> {
    if value.is_empty() || value.len() > MAX_PERMISSION_NAME_BYTES {
        return Err(DomainError::InvalidPermissionName);
    }

    let valid = value.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    });
    if valid {
        return Ok(());
    }

    Err(DomainError::InvalidPermissionName)
}
