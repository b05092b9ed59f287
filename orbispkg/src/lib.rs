//! # OrbisPKG Library
//!
//! A Rust library for building and inspecting the container formats of
//! downloadable content packages.
//!
//! - **PKG**: the top-level container (header, entry table, aligned body)
//! - **SFO**: the `param.sfo` key/value metadata blob stored inside a PKG
//! - **PSARC**: the platform flags in the fixed header of a PSARC archive
//!
//! ## Quick Start
//!
//! ### Creating a PKG
//!
//! ```rust
//! use orbispkg::{EntryId, PkgBuilder, Result, SfoDocument};
//! # use tempfile::TempDir;
//!
//! # fn main() -> Result<()> {
//! # let temp_dir = TempDir::new().unwrap();
//! # let output_path = temp_dir.path().join("dlc.pkg");
//! let content_id = "UP0001-CUSA00745_00-RS001PACK0000001";
//! let sfo = SfoDocument::additional_content(content_id, "Song Pack", "CUSA00745", "01.00")?;
//!
//! let mut builder = PkgBuilder::new();
//! builder
//!     .content_id(content_id)
//!     .add_bytes(EntryId::PARAM_SFO, sfo.encode()?)
//!     .add_bytes(EntryId::FIRST_DATA_FILE, b"song data".to_vec());
//!
//! builder.write_to_file(&output_path)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Reading a PKG
//!
//! ```rust
//! use orbispkg::{EntryId, PkgArchive, PkgBuilder, Result};
//! # use tempfile::TempDir;
//!
//! # fn main() -> Result<()> {
//! # let temp_dir = TempDir::new().unwrap();
//! # let pkg_path = temp_dir.path().join("dlc.pkg");
//! # let mut builder = PkgBuilder::new();
//! # builder.content_id("UP0001-CUSA00745_00-RS001PACK0000001");
//! # builder.add_bytes(EntryId::FIRST_DATA_FILE, b"song data".to_vec());
//! # builder.write_to_file(&pkg_path)?;
//! let mut archive = PkgArchive::open(&pkg_path)?;
//!
//! for entry in archive.entries() {
//!     println!("{}: {} bytes at 0x{:X}", entry.entry_id(), entry.file_size, entry.file_offset);
//! }
//!
//! let data = archive.read_entry(EntryId::FIRST_DATA_FILE)?;
//! assert_eq!(data, b"song data");
//!
//! archive.extract_all(temp_dir.path().join("out"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Patching a PSARC
//!
//! ```rust
//! use orbispkg::psarc::{self, Platform};
//!
//! # let mut data = vec![0u8; 32];
//! # data[..4].copy_from_slice(b"PSAR");
//! # data[28..32].copy_from_slice(&4u32.to_be_bytes());
//! let outcome = psarc::patch_platform_flag(&data, Platform::Generic.code()).unwrap();
//! assert_eq!(outcome.previous, Platform::AlternatePlatform);
//! assert_eq!(&outcome.bytes[28..32], &[0, 0, 0, 0]);
//! ```
//!
//! ## Features
//!
//! - **Streaming Support**: file-backed entries are copied in bounded chunks
//! - **Bit-exact Layout**: deterministic ordering and alignment of the body
//! - **Lossless Round Trips**: parsing a built package yields the same entries
//! - **Error Handling**: one error enum with the offset and size that failed

pub mod align;
pub mod archive;
pub mod builder;
pub mod callbacks;
pub mod container;
pub mod diff;
pub mod entry;
pub mod error;
pub mod format;
pub mod psarc;
pub mod reader;
pub mod reserved;
pub mod sfo;
pub mod writer;

mod constants;
mod utils;

// Re-export main types for convenience
pub use archive::PkgArchive;
pub use builder::{PackageInfo, PackagePlan, PkgBuilder, build};
pub use callbacks::{ArchiveHandler, ControlAction, NoOpHandler, OperationType, ProgressInfo};
pub use constants::{BUFFER_SIZE, DEFAULT_ALIGNMENT};
pub use container::{ParsedContainer, parse};
pub use entry::{EntrySource, PkgEntry};
pub use error::{Error, Result};
pub use format::{ContainerEntry, ContainerHeader, EntryId};
pub use psarc::{PatchOutcome, Platform, PsarcHeader};
pub use reader::{EntrySummary, PkgReader};
pub use reserved::ReservedRegion;
pub use sfo::{SfoDocument, SfoEntry, SfoFormat, SfoValue};
pub use writer::PkgWriter;

// Re-export convenience functions
pub use archive::{create_from_dir, extract, extract_with_progress};

#[cfg(feature = "display")]
pub mod display;
