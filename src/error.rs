//! Registry error taxonomy.
//!
//! Every registry operation reports failure as a value. Nothing here is
//! fatal to the host application.

use crate::backend::BackendError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown key identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("failed to load key status: {0}")]
    Load(#[source] BackendError),

    #[error("failed to read saved value for '{identifier}': {source}")]
    LoadStore {
        identifier: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to save '{identifier}': {source}")]
    Save {
        identifier: String,
        #[source]
        source: StoreError,
    },

    #[error("nothing to test: '{0}' has no value")]
    NothingToTest(String),

    #[error("could not reach validator for '{identifier}': {source}")]
    Transport {
        identifier: String,
        #[source]
        source: BackendError,
    },

    #[error("'{identifier}' rejected: {message}")]
    RemoteInvalid { identifier: String, message: String },
}

impl RegistryError {
    /// Failures caused by an outside system rather than by the caller.
    /// Persisted state is untouched; the user may simply try again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::Load(_)
                | RegistryError::LoadStore { .. }
                | RegistryError::Save { .. }
                | RegistryError::Transport { .. }
        )
    }

    /// JSON-RPC error code for this failure.
    pub fn rpc_code(&self) -> i32 {
        match self {
            RegistryError::UnknownIdentifier(_) => -32004,
            RegistryError::NothingToTest(_) => -32010,
            RegistryError::RemoteInvalid { .. } => -32011,
            RegistryError::Transport { .. } => -32012,
            RegistryError::Save { .. } => -32013,
            RegistryError::Load(_) | RegistryError::LoadStore { .. } => -32014,
        }
    }
}
