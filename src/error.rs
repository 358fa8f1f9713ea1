//! Engine error types and the diagnostics surface.
//!
//! Data-model failures (registries, transforms, uniform layouts) are reported
//! as [`EngineError`] and leave the caller's state untouched. [`Diagnostics`]
//! remembers the most recent failure so a host can show it on screen.

use std::panic::Location;

use thiserror::Error;

use crate::{
    data_structures::{component::ComponentKind, entity::EntityId},
    device::DeviceError,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("an object with id {0} is already registered")]
    DuplicateId(EntityId),
    #[error("game object {owner} already owns a {kind:?} component")]
    DuplicateComponent { owner: EntityId, kind: ComponentKind },
    #[error("uniform property `{0}` is already defined")]
    DuplicateProperty(String),
    #[error("the uniform block already has a GPU buffer")]
    BufferAlreadyCreated,
    #[error("cannot define `{0}` after the uniform block buffer was created")]
    BlockSealed(String),
    #[error("a GPU buffer for id {0} already exists")]
    DuplicateBuffer(EntityId),
    #[error("no GPU buffer is registered for id {0}")]
    MissingBuffer(EntityId),
    #[error("transform of {0} cannot be its own parent")]
    SelfParenting(EntityId),
    #[error("parenting {child} under {parent} would create a cycle")]
    HierarchyCycle { child: EntityId, parent: EntityId },
    #[error("no object with id {0}")]
    UnknownObject(EntityId),
    #[error("{origin}: {message}. {cause}")]
    NullReference {
        origin: &'static str,
        message: String,
        cause: String,
    },
    #[error("cannot derive an index type from an empty index array")]
    EmptyIndexBuffer,
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl EngineError {
    pub(crate) fn null_reference(
        origin: &'static str,
        message: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self::NullReference {
            origin,
            message: message.into(),
            cause: cause.into(),
        }
    }

    /// Short name of the error class, shown next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateId(_) => "DuplicateId",
            Self::DuplicateComponent { .. } => "DuplicateComponent",
            Self::DuplicateProperty(_) => "DuplicateProperty",
            Self::BufferAlreadyCreated => "BufferAlreadyCreated",
            Self::BlockSealed(_) => "BlockSealed",
            Self::DuplicateBuffer(_) => "DuplicateBuffer",
            Self::MissingBuffer(_) => "MissingBuffer",
            Self::SelfParenting(_) => "SelfParenting",
            Self::HierarchyCycle { .. } => "HierarchyCycle",
            Self::UnknownObject(_) => "UnknownObject",
            Self::NullReference { .. } => "NullReference",
            Self::EmptyIndexBuffer => "EmptyIndexBuffer",
            Self::Device(_) => "Device",
        }
    }
}

/// One entry of the diagnostics surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorReport {
    pub message: String,
    pub kind: &'static str,
    pub origin: String,
}

/// Keeps the latest reported error.
///
/// Reporting can be switched off while probing calls that are expected to
/// fail, e.g. looking up the current scene before one was loaded.
#[derive(Debug)]
pub struct Diagnostics {
    enabled: bool,
    last: Option<ErrorReport>,
    reported: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            enabled: true,
            last: None,
            reported: 0,
        }
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    #[track_caller]
    pub fn report(&mut self, error: &EngineError) {
        if !self.enabled {
            return;
        }
        let location = Location::caller();
        let origin = format!("{}:{}", location.file(), location.line());
        log::error!("[{}] {} ({})", error.kind(), error, origin);
        self.last = Some(ErrorReport {
            message: error.to_string(),
            kind: error.kind(),
            origin,
        });
        self.reported += 1;
    }

    pub fn last(&self) -> Option<&ErrorReport> {
        self.last.as_ref()
    }

    pub fn reported(&self) -> usize {
        self.reported
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}
