//! Record types and the index catalog
//!
//! Record types are registered once. Registration resolves one positional
//! accessor per field, so query-time code reads fields by position and
//! never looks them up by name per record.
//!
//! Index descriptors are immutable once registered and are shared by the
//! planner and the store through `Arc`.

mod catalog;
mod errors;
mod index;
mod record;

pub use catalog::{IndexCatalog, SchemaCatalog};
pub use errors::{SchemaError, SchemaResult};
pub use index::{IndexDescriptor, IndexKind};
pub use record::{FieldAccessor, FieldDef, FieldType, Record, RecordType, RecordTypeBuilder};
