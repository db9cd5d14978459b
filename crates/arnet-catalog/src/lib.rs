//! Message catalog for ARSDK devices.
//!
//! Maps dotted message paths (`ardrone3.Piloting.TakeOff`) and numeric
//! `(feature, class, message)` identities to [`MessageDescriptor`]s that know
//! how to encode and decode their arguments, which channel they travel on,
//! and which event terminates a command's response.
//!
//! Catalogs are built from JSON feature documents. A default catalog covering
//! `common`, `ardrone3`, `skyctrl` and `drone_manager` is embedded.

pub mod args;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod error;

pub use args::{ArgSpec, ArgType};
pub use catalog::{embedded_documents, Catalog, MessageCatalog};
pub use config::{CatalogConfig, DEFAULT_MODULES};
pub use descriptor::{EventShape, MessageDescriptor, MessageKind, Params};
pub use error::{CatalogError, Result};
