//! # ui-datasource: tag-indexed data sources for UI bindings
//!
//! Producers (gameplay code, services) publish plain structs under hierarchical
//! tags such as `player.stats`. UI widgets bind to a tag plus a field path such
//! as `health` or `slots[2].count` and read typed values through it, without
//! compile-time knowledge of the producer's type.
//!
//! ## Architecture
//!
//! - **Schema Store**: builds and caches field layouts from a host
//!   [`ReflectionProvider`](schema::ReflectionProvider)
//! - **Struct View**: typed reads and writes over a struct's byte image
//! - **Registry**: copy-on-write `tag -> DataSource` snapshot, lock-free for readers
//! - **Change Notifier**: dirty tags recorded by producers, drained once per cycle
//! - **Binding Resolver**: lazily resolves and caches bindings, invalidated by
//!   drained change notifications
//! - **Validator**: checks authored bindings against schemas and a declared namespace
//!
//! ## Example
//!
//! ```ignore
//! use ui_datasource::{Binding, BindingSet, DataSource, Registry, StructInstance, Tag};
//!
//! let registry = Registry::new();
//! let stats = StructInstance::zeroed(schema).into_shared();
//! registry.register(Tag::new("player.stats")?, DataSource::new(&stats))?;
//!
//! let mut bindings = BindingSet::new();
//! let hp = bindings.add(Binding::new("player.stats", "health"));
//!
//! // Once per UI frame
//! let mut cycle = bindings.begin_cycle(&registry);
//! let health = cycle.read(hp)?;
//! ```

pub mod binding;
pub mod config;
pub mod error;
pub mod mock;
pub mod notifier;
pub mod path;
pub mod registry;
pub mod schema;
pub mod tag;
pub mod types;
pub mod validator;
pub mod view;

// Re-export commonly used types
pub use binding::{Binding, BindingId, BindingSet, BindingState, Cycle, ResolutionError};
pub use config::{DatasourceSettings, ProjectFile};
pub use error::{DatasourceError, Result, ResultExt};
pub use notifier::{ChangeEvent, ChangeKind, ChangeNotifier, Invalidations};
pub use path::FieldPath;
pub use registry::{DataSource, RegistrationHandle, Registry, RegistryError};
pub use schema::{Schema, SchemaStore};
pub use tag::Tag;
pub use types::{TypeTag, TypedValue};
pub use validator::{BindingDeclaration, Diagnostic, Severity, ValidationReport, Validator};
pub use view::{SharedInstance, StructInstance, StructView, StructViewMut};
