//! kpkg Plugin - the kapp-controller packages plugin
//!
//! [`Server`] serves every package and repository operation over any
//! [`kpkg_kube::ResourceStore`]:
//!
//! - available packages: summaries, versions and detail
//! - installed packages: summaries, detail, create, update and delete
//! - package repositories: summaries, detail, add, update, delete and permissions

mod available;
mod installed;
mod join;
mod render;
mod repositories;
mod server;

pub use installed::VALUES_KEY;
pub use join::{PackageStream, STREAM_CAPACITY};
pub use repositories::DESCRIPTION_ANNOTATION;
pub use server::Server;
