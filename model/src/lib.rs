//! Closed variant tables for schema-derived model hierarchies.
//!
//! A [`VariantTable`] holds one [`Tag`] per type definition of a schema, together with the single
//! base each tag derives from. Tables are either declared programmatically through
//! [`VariantTable::builder`] or read from an XSD document with [`read_variant_table`].

pub mod builtins;
pub mod error;
pub mod facets;
pub mod schema;
pub mod table;
pub mod tag;
pub mod xstypes;

pub use error::{LoadError, TableError};
pub use facets::{Bound, FacetSource, FacetViolation, Facets, Pattern};
pub use schema::{read_variant_table, LoadOptions};
pub use table::{
    Ancestors, TypeRef, Variant, VariantKind, VariantTable, VariantTableBuilder, Variety,
};
pub use tag::{DynamicObject, FamilyId, ModelObject, Tag};
pub use xstypes::QName;

/// What to do with a type whose base, item or member type lies in a namespace other than the
/// schema's own, or names something the XML Schema namespace does not define.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ForeignBaseAction {
    Deny,
    Warn,
    Allow,
}

/// What to do with a facet that cannot be evaluated: a pattern the regex engine cannot express,
/// or a bound that is not a number.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnsupportedFacetAction {
    Deny,
    Warn,
    Allow,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IncludeSimpleTypes {
    Yes,
    No,
}
