use std::sync::Arc;

use zeroize::Zeroizing;

/// Wraps around a callback or a fixed secret used to protect session keys.
#[derive(Clone, derive_more::Debug)]
pub enum Password {
    Dynamic(#[debug("Arc<Fn>")] Arc<dyn Fn() -> Zeroizing<Vec<u8>> + Send + Sync>),
    Static(#[debug("***")] Zeroizing<Vec<u8>>),
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self::Static(value.into_bytes().into())
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::Static(value.as_bytes().to_vec().into())
    }
}

impl From<&[u8]> for Password {
    fn from(value: &[u8]) -> Self {
        Self::Static(value.to_vec().into())
    }
}

impl From<Vec<u8>> for Password {
    fn from(value: Vec<u8>) -> Self {
        Self::Static(value.into())
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::empty()
    }
}

impl Password {
    /// Creates an empty password.
    pub fn empty() -> Self {
        Self::Static(Vec::new().into())
    }

    /// Builds a password that is produced on demand, e.g. from a prompt.
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn() -> Zeroizing<Vec<u8>> + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    /// Executes the callback and returns the result.
    pub fn read(&self) -> Zeroizing<Vec<u8>> {
        match self {
            Self::Dynamic(ref f) => f(),
            Self::Static(ref s) => s.clone(),
        }
    }
}
