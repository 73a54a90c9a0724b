//! Backend tags and default-backend selection.
//!
//! A backend is picked at compile time by a zero-sized tag type. The tag
//! carries no state; it only decides which kernel implementation the
//! dispatch functions instantiate.
//!
//! # Supported Backends
//!
//! - [`Native`]: scalar loops over the bare [`Matrix`](crate::matrix::Matrix) contract (always built).
//! - [`Cpu`]: rayon-parallel kernels over contiguous storage (`cpu` feature, default).
//! - [`Wgpu`]: compute shaders on a GPU through `wgpu` (`wgpu` feature).
//! - [`Sparse`]: reserved tag; no kernels exist for it yet.
//!
//! A tag whose feature is disabled does not exist, and a tag that lacks a
//! kernel for some operation fails the trait bound, so misuse is a build
//! error rather than a runtime one:
//!
//! ```compile_fail
//! use linalg_dispatch::{matrix, Linalg, Sparse};
//! let a = matrix![[1.0, 2.0]];
//! let b = matrix![[3.0, 4.0]];
//! let mut c = matrix![[0.0, 0.0]];
//! Linalg::<Sparse>::add(&a, &b, &mut c, 1.0, 1.0).unwrap();
//! ```
//!
//! # Default Selection
//!
//! Callers who do not name a backend get [`DefaultBackend`], resolved through
//! [`BackendSelector`] from a marker describing the class of operation. Naming
//! a tag explicitly with [`Linalg`](crate::Linalg) always wins.

use core::convert::TryFrom;
use core::fmt;

/// Runtime-readable identity of a backend tag.
///
/// Used in logs and error messages; dispatch itself never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BackendKind {
    /// Scalar loop backend.
    Native = 0,
    /// Multi-threaded dense CPU backend.
    Cpu = 1,
    /// GPU compute backend using `wgpu`.
    Wgpu = 2,
    /// Placeholder for sparse kernels.
    Sparse = 3,
}

impl BackendKind {
    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Cpu => "cpu",
            Self::Wgpu => "wgpu",
            Self::Sparse => "sparse",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for BackendKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Native),
            1 => Ok(Self::Cpu),
            2 => Ok(Self::Wgpu),
            3 => Ok(Self::Sparse),
            _ => Err(()),
        }
    }
}

/// A compile-time backend tag.
pub trait Backend: Copy + Default + Send + Sync + 'static {
    /// Identity of this tag.
    const KIND: BackendKind;
    /// Name used in logs; same as `KIND.name()`.
    const NAME: &'static str = Self::KIND.name();
}

/// Scalar loop backend. Works with any [`Matrix`](crate::matrix::Matrix).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Native;

impl Backend for Native {
    const KIND: BackendKind = BackendKind::Native;
}

/// Multi-threaded dense CPU backend. Requires [`Contiguous`](crate::matrix::Contiguous) storage.
#[cfg(feature = "cpu")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cpu;

#[cfg(feature = "cpu")]
impl Backend for Cpu {
    const KIND: BackendKind = BackendKind::Cpu;
}

/// GPU compute backend. Requires [`Contiguous`](crate::matrix::Contiguous)
/// storage; computes in `f32`.
#[cfg(feature = "wgpu")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wgpu;

#[cfg(feature = "wgpu")]
impl Backend for Wgpu {
    const KIND: BackendKind = BackendKind::Wgpu;
}

/// Reserved for sparse kernels. No operation accepts it yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sparse;

impl Backend for Sparse {
    const KIND: BackendKind = BackendKind::Sparse;
}

/// Maps a marker for a class of operations to exactly one backend tag.
pub trait BackendSelector {
    /// The tag used when the caller does not name one.
    type Backend: Backend;
}

/// Marker for the core elementwise and product operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Core;

#[cfg(feature = "cpu")]
impl BackendSelector for Core {
    type Backend = Cpu;
}

#[cfg(not(feature = "cpu"))]
impl BackendSelector for Core {
    type Backend = Native;
}

/// The backend a marker resolves to. `DefaultBackend` alone is the one used
/// by the crate-level operation functions.
///
/// - With `cpu` feature: [`Cpu`]
/// - Otherwise: [`Native`]
pub type DefaultBackend<S = Core> = <S as BackendSelector>::Backend;

/// Backends compiled into this build that provide kernels.
#[must_use]
pub fn available_backends() -> &'static [BackendKind] {
    &[
        BackendKind::Native,
        #[cfg(feature = "cpu")]
        BackendKind::Cpu,
        #[cfg(feature = "wgpu")]
        BackendKind::Wgpu,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_u8() {
        for kind in [
            BackendKind::Native,
            BackendKind::Cpu,
            BackendKind::Wgpu,
            BackendKind::Sparse,
        ] {
            assert_eq!(BackendKind::try_from(kind as u8), Ok(kind));
        }
        assert!(BackendKind::try_from(4).is_err());
    }

    #[test]
    fn default_backend_follows_features() {
        #[cfg(feature = "cpu")]
        assert_eq!(<DefaultBackend as Backend>::KIND, BackendKind::Cpu);
        #[cfg(not(feature = "cpu"))]
        assert_eq!(<DefaultBackend as Backend>::KIND, BackendKind::Native);
    }

    #[test]
    fn sparse_is_never_listed_as_available() {
        let available = available_backends();
        assert!(available.contains(&BackendKind::Native));
        assert!(!available.contains(&BackendKind::Sparse));
        assert_eq!(available.contains(&BackendKind::Cpu), cfg!(feature = "cpu"));
        assert_eq!(Native::NAME, "native");
    }
}
