//! Buzón Model
//!
//! Leaf primitives shared by every other crate in the workspace.
//!
//! # Core Concepts
//!
//! - [`CaseId`], [`SubmitterId`], [`BlobId`]: ULID-backed opaque identifiers
//! - [`Channel`], [`CaseKind`], [`CaseStatus`], [`Priority`]: closed enums with
//!   stable string forms used by storage and the CLI
//! - [`Category`]: the fixed category taxonomy
//! - [`FolioFormatter`]: renders and parses the public tracking code
//!
//! # Example
//!
//! ```rust
//! use buzon_model::{CategoryCode, Channel, FolioFormatter, FolioParts, Year};
//! use std::str::FromStr;
//!
//! let formatter = FolioFormatter::default();
//! let parts = FolioParts {
//!     channel: Channel::Digital,
//!     year: Year::new(2025).unwrap(),
//!     consecutive: 7,
//!     category: CategoryCode::from_str("ACA").unwrap(),
//! };
//!
//! let folio = formatter.format(&parts).unwrap();
//! assert_eq!(folio.as_str(), "D0007-ACA-UNACH-25");
//! assert_eq!(formatter.parse(folio.as_str()).unwrap(), parts);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod case;
mod category;
mod error;
mod folio;
mod ids;

// Re-exports
pub use case::{CaseKind, CaseStatus, Channel, Priority};
pub use category::{categories, category_by_code, category_by_id, Category, CategoryCode, CategoryId};
pub use error::{FolioError, ParseError};
pub use folio::{Folio, FolioFormatter, FolioParts, InstitutionCode, Year, DEFAULT_INSTITUTION};
pub use ids::{BlobId, CaseId, SubmitterId};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
