use lazy_static::lazy_static;
use regex::Regex;

use super::xstypes::QName;

// Namespace of XML Schema itself (XSD 1.1 pt. 1, §1.3.1)
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

lazy_static! {
    /// The `xs:anyType` qualified name, used as the default universal base variant
    pub static ref XS_ANY_TYPE_NAME: QName = QName::with_namespace(XS_NAMESPACE, "anyType");
    /// The `xs:anySimpleType` qualified name, standing in for item and member types that are not
    /// variants of the table
    pub static ref XS_ANY_SIMPLE_TYPE_NAME: QName =
        QName::with_namespace(XS_NAMESPACE, "anySimpleType");

    // Lexical spaces from pt. 2, §3.3
    static ref BOOLEAN: Regex = Regex::new(r"^(?:true|false|1|0)$").unwrap();
    static ref DECIMAL: Regex = Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)$").unwrap();
    static ref FLOAT: Regex =
        Regex::new(r"^(?:[+-]?(?:(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?|INF)|NaN)$")
            .unwrap();
    static ref INTEGER: Regex = Regex::new(r"^[+-]?[0-9]+$").unwrap();
}

/// How the lexical space of a builtin is checked. Types with `Any` are not checked at all.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Lexical {
    Any,
    Boolean,
    Decimal,
    Float,
    /// An integer within the inclusive bounds, if any
    Integer(Option<i128>, Option<i128>),
}

struct BuiltinInfo {
    name: &'static str,
    lexical: Lexical,
}

impl BuiltinInfo {
    const fn new(name: &'static str, lexical: Lexical) -> Self {
        Self { name, lexical }
    }
}

/// The builtin type definitions of pt. 2, §3 (primitive and ordinary), plus the special types.
const BUILTIN_TYPES: [BuiltinInfo; 51] = {
    use Lexical::*;
    [
        BuiltinInfo::new("anyType", Any),
        BuiltinInfo::new("anySimpleType", Any),
        BuiltinInfo::new("anyAtomicType", Any),
        BuiltinInfo::new("error", Any),
        // Primitive
        BuiltinInfo::new("string", Any),
        BuiltinInfo::new("boolean", Boolean),
        BuiltinInfo::new("float", Float),
        BuiltinInfo::new("double", Float),
        BuiltinInfo::new("decimal", Decimal),
        BuiltinInfo::new("dateTime", Any),
        BuiltinInfo::new("duration", Any),
        BuiltinInfo::new("time", Any),
        BuiltinInfo::new("date", Any),
        BuiltinInfo::new("gMonth", Any),
        BuiltinInfo::new("gMonthDay", Any),
        BuiltinInfo::new("gDay", Any),
        BuiltinInfo::new("gYear", Any),
        BuiltinInfo::new("gYearMonth", Any),
        BuiltinInfo::new("hexBinary", Any),
        BuiltinInfo::new("base64Binary", Any),
        BuiltinInfo::new("anyURI", Any),
        BuiltinInfo::new("QName", Any),
        BuiltinInfo::new("NOTATION", Any),
        // Ordinary
        BuiltinInfo::new("normalizedString", Any),
        BuiltinInfo::new("token", Any),
        BuiltinInfo::new("language", Any),
        BuiltinInfo::new("NMTOKEN", Any),
        BuiltinInfo::new("NMTOKENS", Any),
        BuiltinInfo::new("Name", Any),
        BuiltinInfo::new("NCName", Any),
        BuiltinInfo::new("ID", Any),
        BuiltinInfo::new("IDREF", Any),
        BuiltinInfo::new("IDREFS", Any),
        BuiltinInfo::new("ENTITY", Any),
        BuiltinInfo::new("ENTITIES", Any),
        BuiltinInfo::new("integer", Integer(None, None)),
        BuiltinInfo::new("nonPositiveInteger", Integer(None, Some(0))),
        BuiltinInfo::new("negativeInteger", Integer(None, Some(-1))),
        BuiltinInfo::new("long", Integer(Some(i64::MIN as i128), Some(i64::MAX as i128))),
        BuiltinInfo::new("int", Integer(Some(i32::MIN as i128), Some(i32::MAX as i128))),
        BuiltinInfo::new("short", Integer(Some(i16::MIN as i128), Some(i16::MAX as i128))),
        BuiltinInfo::new("byte", Integer(Some(i8::MIN as i128), Some(i8::MAX as i128))),
        BuiltinInfo::new("nonNegativeInteger", Integer(Some(0), None)),
        BuiltinInfo::new("unsignedLong", Integer(Some(0), Some(u64::MAX as i128))),
        BuiltinInfo::new("unsignedInt", Integer(Some(0), Some(u32::MAX as i128))),
        BuiltinInfo::new("unsignedShort", Integer(Some(0), Some(u16::MAX as i128))),
        BuiltinInfo::new("unsignedByte", Integer(Some(0), Some(u8::MAX as i128))),
        BuiltinInfo::new("positiveInteger", Integer(Some(1), None)),
        BuiltinInfo::new("yearMonthDuration", Any),
        BuiltinInfo::new("dayTimeDuration", Any),
        BuiltinInfo::new("dateTimeStamp", Any),
    ]
};

fn lookup(name: &QName) -> Option<&'static BuiltinInfo> {
    if !is_in_xs_namespace(name) {
        return None;
    }
    BUILTIN_TYPES.iter().find(|b| b.name == name.local_name)
}

pub fn is_in_xs_namespace(name: &QName) -> bool {
    name.is_in_namespace(Some(XS_NAMESPACE))
}

/// Whether `name` is one of the builtin type definitions. Builtins are never part of a schema's
/// own variant family.
pub fn is_builtin_name(name: &QName) -> bool {
    lookup(name).is_some()
}

/// Whether `value` lies in the lexical space of the builtin `name`. Only the boolean and numeric
/// builtins are checked; other builtins and unknown names accept every value.
pub fn is_valid_lexical(name: &QName, value: &str) -> bool {
    let Some(info) = lookup(name) else {
        return true;
    };
    // All checked builtins collapse whitespace
    let value = value.trim();
    match info.lexical {
        Lexical::Any => true,
        Lexical::Boolean => BOOLEAN.is_match(value),
        Lexical::Decimal => DECIMAL.is_match(value),
        Lexical::Float => FLOAT.is_match(value),
        Lexical::Integer(min, max) => {
            if !INTEGER.is_match(value) {
                return false;
            }
            match value.parse::<i128>() {
                Ok(v) => min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m),
                // Out of i128 range: only valid when unbounded in that direction
                Err(_) if value.starts_with('-') => min.is_none(),
                Err(_) => max.is_none(),
            }
        }
    }
}
