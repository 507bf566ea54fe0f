//! Records stored by the Daos.

pub mod permission;
pub mod warn;

pub use permission::PermState;
pub use warn::Warn;
