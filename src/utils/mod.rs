//! Utility functions shared by the reference collaborators.
//!
//! ### Generating File Hashes
//!
//! ```no_run
//! use rust_extractor::utils::hash::sha256_file;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let file_path = Path::new("/evidence/suspicious.exe");
//! let max_size = 64 * 1024 * 1024;
//!
//! match sha256_file(file_path, max_size)? {
//!     Some(hash) => println!("SHA-256: {}", hash),
//!     None => println!("File exceeds size limit"),
//! }
//! # Ok(())
//! # }
//! ```

/// Cryptographic hash calculation utilities
pub mod hash;
