//! Cryptographic primitives.
//!
//! Hashing, multiprecision integers, and the RSA/DSA operations the
//! signature engine is built on.  The backends are treated as black
//! boxes; everything protocol-shaped (framings, trailers, MPI wire
//! form) lives here rather than in the backend crates.

pub(crate) mod asymmetric;
pub mod hash;
pub mod mpi;

pub use hash::Context;
