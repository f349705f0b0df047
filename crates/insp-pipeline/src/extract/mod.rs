//! Rule-driven metadata extraction
//!
//! Three independent sources feed one record: folder segments ([`path`]),
//! file-name segments ([`filename`]) and the report body ([`content`]). All
//! of them route raw strings through the same [`Coercer`].

pub mod coerce;
pub mod content;
pub mod filename;
pub mod key_data;
pub mod path;
pub mod record;
pub mod spec;

pub use coerce::{Coerced, Coercer, FieldOutcome};
pub use content::ContentExtractor;
pub use key_data::KeyData;
pub use record::{MetadataRecord, NONPARSED_PREFIX};
pub use spec::{ExtractionSpec, FieldLabel, LabelMap, ParseAs, PatternId};
