//! Source-repository discovery and validation.
//!
//! Registry metadata points at candidate SCM URLs; this crate canonicalizes
//! them ([`url_normalize`]), talks to the hosting provider ([`github`],
//! [`gitlab`]) through a common [`providers::Provider`] trait, matches
//! package versions against tags and releases ([`version_match`]), and glues
//! it together in [`validation`]. Read-the-Docs documentation URLs resolve
//! to their backing repository via [`rtd`].

pub mod github;
pub mod gitlab;
pub mod providers;
pub mod rtd;
pub mod url_normalize;
pub mod validation;
pub mod version_match;
