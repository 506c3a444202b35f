//! Cryptographic primitives for CASC content retrieval
//!
//! This crate provides the hashing and decryption pieces the rest of the
//! workspace builds on:
//!
//! - **Hashing**: MD5 content and encoding keys ([`ContentKey`], [`EncodingKey`])
//! - **Encryption**: the CASC Salsa20 variant used by encrypted BLTE blocks
//! - **Key Management**: the process-wide [`Keyring`] with JSON persistence,
//!   and the [`KeyProvider`] seam the block decoder consumes
//!
//! # Examples
//!
//! ## Content Key Generation
//!
//! ```
//! use casket_crypto::ContentKey;
//!
//! let key = ContentKey::from_data(b"Hello, World!");
//! assert_eq!(key.to_hex().len(), 32);
//! ```
//!
//! ## Looking up a decryption key
//!
//! ```
//! use casket_crypto::{KeyName, KeyProvider, Keyring};
//!
//! let keyring = Keyring::in_memory();
//! assert!(keyring.add_key("fa505078126acb3e", "bdc51862abed79b2de48c8e7e66c6200"));
//!
//! let name: KeyName = "FA505078126ACB3E".parse().expect("valid key name");
//! assert!(keyring.key(name).is_some());
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod hash;
pub mod keyring;
pub mod keys;
pub mod provider;
pub mod salsa20;

pub use error::CryptoError;

pub use hash::{ContentKey, EncodingKey, FileDataId, md5_of};
pub use keyring::Keyring;
pub use keys::{KeyName, TactKey, parse_key_list};
pub use provider::{KeyProvider, StaticKeys};
pub use salsa20::Salsa20Cipher;
