use thiserror::Error;

use crate::xstypes::QName;

/// Errors raised while assembling a [`VariantTable`](crate::VariantTable).
#[derive(Debug, Error)]
pub enum TableError {
    #[error("variant {0} is declared more than once")]
    DuplicateVariant(QName),
    #[error("variant {variant} derives from unknown base {base}")]
    UnknownBase { variant: QName, base: QName },
    #[error("derivation cycle detected at variant {0}")]
    Cycle(QName),
    #[error("variant {variant} refers to unknown item or member type {reference}")]
    UnknownTypeReference { variant: QName, reference: QName },
    #[error("too many variants for a single table")]
    Overflow,
    #[error("pattern facet {pattern:?} of {variant} is not supported")]
    InvalidPattern {
        variant: QName,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("{facet} facet {value:?} of {variant} is not supported")]
    InvalidFacet {
        variant: QName,
        facet: &'static str,
        value: String,
    },
}

/// Errors raised while reading a variant table from an XSD document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to resolve prefix {0:?} to a namespace URI")]
    NamePrefixNotResolved(String),
    #[error("expected a <schema> root element, found <{0}>")]
    NotASchema(String),
    #[error("top-level <{0}> without a name attribute")]
    MissingName(&'static str),
    #[error("base {base} of {variant} belongs to a foreign namespace")]
    ForeignBase { variant: QName, base: QName },
    #[error("{variant} refers to {name}, which is not a builtin type")]
    UnknownBuiltin { variant: QName, name: QName },
    #[error(transparent)]
    Table(#[from] TableError),
}
