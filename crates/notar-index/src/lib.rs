//! Certificate index for Notar.
//!
//! One [`CertificateRecord`] per anchored digest. The digest is the unique
//! key: inserting a second record for the same digest fails and leaves the
//! first untouched.
//!
//! Two implementations of [`CertificateIndex`]:
//! - [`InMemoryCertificateIndex`]: `RwLock`-guarded map, for tests and
//!   short-lived processes
//! - [`FileCertificateIndex`]: append-only, CRC-framed log replayed on open

pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::{IndexError, IndexResult};
pub use file::FileCertificateIndex;
pub use memory::InMemoryCertificateIndex;
pub use record::CertificateRecord;
pub use traits::CertificateIndex;
