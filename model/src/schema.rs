use std::collections::HashSet;

use roxmltree::{Document, Node};
use tracing::{debug, warn};

use super::builtins::{
    is_builtin_name, is_in_xs_namespace, XS_ANY_SIMPLE_TYPE_NAME, XS_NAMESPACE,
};
use super::error::LoadError;
use super::facets::FacetSource;
use super::table::{VariantKind, VariantTable, Variety};
use super::xstypes::QName;
use super::{ForeignBaseAction, IncludeSimpleTypes, UnsupportedFacetAction};

const SCHEMA_TAG: &str = "schema";
const COMPLEX_TYPE_TAG: &str = "complexType";
const SIMPLE_TYPE_TAG: &str = "simpleType";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoadOptions {
    pub foreign_base: ForeignBaseAction,
    pub unsupported_facet: UnsupportedFacetAction,
    pub simple_types: IncludeSimpleTypes,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            foreign_base: ForeignBaseAction::Deny,
            unsupported_facet: UnsupportedFacetAction::Deny,
            simple_types: IncludeSimpleTypes::Yes,
        }
    }
}

fn is_xs_element(node: Node, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(XS_NAMESPACE)
}

fn first_xs_child<'a, 'input>(node: Node<'a, 'input>, names: &[&str]) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| names.iter().any(|name| is_xs_element(*c, name)))
}

/// Finds the `<extension>` or `<restriction>` element that carries a type definition's base.
///
/// `<list>` and `<union>` simple types, and complex types without explicit content derivation,
/// have none; they derive from the root.
fn derivation_node<'a, 'input>(type_node: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    if is_xs_element(type_node, SIMPLE_TYPE_TAG) {
        first_xs_child(type_node, &["restriction"])
    } else {
        let content = first_xs_child(type_node, &["complexContent", "simpleContent"])?;
        first_xs_child(content, &["extension", "restriction"])
    }
}

fn facet_source(derivation: Node) -> FacetSource {
    let values = |facet: &str| {
        derivation
            .children()
            .filter(|c| is_xs_element(*c, facet))
            .filter_map(|c| c.attribute("value"))
            .map(str::to_string)
            .collect::<Vec<_>>()
    };
    let value = |facet: &str| {
        first_xs_child(derivation, &[facet])
            .and_then(|c| c.attribute("value"))
            .map(str::to_string)
    };
    FacetSource {
        patterns: values("pattern"),
        enumeration: values("enumeration"),
        length: value("length"),
        min_length: value("minLength"),
        max_length: value("maxLength"),
        min_inclusive: value("minInclusive"),
        min_exclusive: value("minExclusive"),
        max_inclusive: value("maxInclusive"),
        max_exclusive: value("maxExclusive"),
    }
}

/// How a type name used by a variant relates to the table being read.
enum Reference {
    Builtin(QName),
    Local(QName),
    /// Tolerated foreign or unknown XML Schema name
    Unattached,
}

impl Reference {
    fn into_base(self) -> Option<QName> {
        match self {
            Self::Local(name) => Some(name),
            Self::Builtin(_) | Self::Unattached => None,
        }
    }

    fn into_member(self) -> QName {
        match self {
            Self::Builtin(name) | Self::Local(name) => name,
            Self::Unattached => XS_ANY_SIMPLE_TYPE_NAME.clone(),
        }
    }
}

struct Resolver<'a> {
    variant: &'a QName,
    target_namespace: Option<&'a str>,
    foreign_base: ForeignBaseAction,
}

impl Resolver<'_> {
    fn resolve(&self, name: &str, context: Node) -> Result<Reference, LoadError> {
        let name = QName::parse(name, context)?;
        if is_builtin_name(&name) {
            return Ok(Reference::Builtin(name));
        }
        if name.is_in_namespace(self.target_namespace) {
            return Ok(Reference::Local(name));
        }
        let variant = self.variant;
        let unknown_builtin = is_in_xs_namespace(&name);
        match self.foreign_base {
            ForeignBaseAction::Deny if unknown_builtin => Err(LoadError::UnknownBuiltin {
                variant: variant.clone(),
                name,
            }),
            ForeignBaseAction::Deny => Err(LoadError::ForeignBase {
                variant: variant.clone(),
                base: name,
            }),
            ForeignBaseAction::Warn => {
                if unknown_builtin {
                    warn!(%variant, %name, "ignoring reference to unknown builtin type");
                } else {
                    warn!(%variant, %name, "ignoring reference to foreign type");
                }
                Ok(Reference::Unattached)
            }
            ForeignBaseAction::Allow => Ok(Reference::Unattached),
        }
    }

    /// The {variety} of a simple type definition, with item and member types by name.
    /// Anonymous item and member types are not variants; they stand in as `xs:anySimpleType`.
    fn variety(&self, type_node: Node) -> Result<Variety<QName>, LoadError> {
        if let Some(list) = first_xs_child(type_node, &["list"]) {
            let item = match list.attribute("itemType") {
                Some(item) => self.resolve(item, list)?.into_member(),
                None => XS_ANY_SIMPLE_TYPE_NAME.clone(),
            };
            return Ok(Variety::List(item));
        }
        if let Some(union) = first_xs_child(type_node, &["union"]) {
            let mut members = union
                .attribute("memberTypes")
                .unwrap_or_default()
                .split_whitespace()
                .map(|m| Ok(self.resolve(m, union)?.into_member()))
                .collect::<Result<Vec<_>, LoadError>>()?;
            members.extend(
                union
                    .children()
                    .filter(|c| is_xs_element(*c, SIMPLE_TYPE_TAG))
                    .map(|_| XS_ANY_SIMPLE_TYPE_NAME.clone()),
            );
            return Ok(Variety::Union(members));
        }
        Ok(Variety::Atomic)
    }
}

/// Reads the closed variant set of a schema document: one variant per named top-level type
/// definition, derived from the base named by its `<extension>` or `<restriction>`.
///
/// Imports are not followed. Bases from the XML Schema namespace map to the root; bases from any
/// other foreign namespace are handled according to [`LoadOptions::foreign_base`].
pub fn read_variant_table(
    schema: &Document,
    options: &LoadOptions,
) -> Result<VariantTable, LoadError> {
    let schema = schema.root_element();
    if !is_xs_element(schema, SCHEMA_TAG) {
        return Err(LoadError::NotASchema(schema.tag_name().name().to_string()));
    }
    let target_namespace = schema.attribute("targetNamespace");
    let local_name = |local: &str| QName::with_optional_namespace(target_namespace, local);

    let top_level_types = schema
        .children()
        .filter(|c| is_xs_element(*c, COMPLEX_TYPE_TAG) || is_xs_element(*c, SIMPLE_TYPE_TAG))
        .collect::<Vec<_>>();

    // Simple types are only skipped as variants; complex types with simple content may still
    // derive from them, in which case they attach to the root instead.
    let mut skipped_simple_types = HashSet::new();

    let mut builder = VariantTable::builder(target_namespace)
        .unsupported_facet(options.unsupported_facet);

    for type_node in top_level_types.iter().copied() {
        let kind = if is_xs_element(type_node, SIMPLE_TYPE_TAG) {
            VariantKind::Simple
        } else {
            VariantKind::Complex
        };
        let tag_name = match kind {
            VariantKind::Simple => SIMPLE_TYPE_TAG,
            _ => COMPLEX_TYPE_TAG,
        };
        let name = type_node
            .attribute("name")
            .ok_or(LoadError::MissingName(tag_name))?;
        let name = local_name(name);

        if kind == VariantKind::Simple && options.simple_types == IncludeSimpleTypes::No {
            skipped_simple_types.insert(name);
            continue;
        }

        let resolver = Resolver {
            variant: &name,
            target_namespace,
            foreign_base: options.foreign_base,
        };
        let derivation = derivation_node(type_node);
        let facets = derivation.map(facet_source).unwrap_or_default();
        let base = match derivation.and_then(|d| d.attribute("base").map(|b| (b, d))) {
            None => None,
            Some((base, derivation)) => resolver.resolve(base, derivation)?.into_base(),
        };
        let variety = match kind {
            VariantKind::Simple => resolver.variety(type_node)?,
            _ => Variety::Atomic,
        };

        builder.declare(name, kind, base, facets, variety);
    }

    // Second pass is needed since bases may be declared after their derived types
    let builder = builder.map_references(|reference| {
        if skipped_simple_types.contains(reference) {
            None
        } else {
            Some(reference.clone())
        }
    });

    let table = builder.build()?;
    debug!(
        target_namespace = target_namespace.unwrap_or("<none>"),
        variants = table.len(),
        "read variant table from schema"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::XS_ANY_TYPE_NAME;
    use crate::error::TableError;
    use crate::table::TypeRef;

    const GML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<schema xmlns="http://www.w3.org/2001/XMLSchema"
        xmlns:gml="http://www.opengis.net/gml"
        xmlns:xlink="http://www.w3.org/1999/xlink"
        targetNamespace="http://www.opengis.net/gml">
  <complexType name="PointType">
    <complexContent>
      <extension base="gml:AbstractGeometricPrimitiveType">
        <sequence/>
      </extension>
    </complexContent>
  </complexType>
  <complexType name="AbstractGMLType" abstract="true">
    <sequence/>
  </complexType>
  <complexType name="AbstractGeometryType" abstract="true">
    <complexContent>
      <extension base="gml:AbstractGMLType"/>
    </complexContent>
  </complexType>
  <complexType name="AbstractGeometricPrimitiveType" abstract="true">
    <complexContent>
      <extension base="gml:AbstractGeometryType"/>
    </complexContent>
  </complexType>
  <complexType name="CodeType">
    <simpleContent>
      <extension base="string"/>
    </simpleContent>
  </complexType>
  <simpleType name="SignType">
    <restriction base="string">
      <enumeration value="-"/>
      <enumeration value="+"/>
    </restriction>
  </simpleType>
  <simpleType name="CurrencyType">
    <restriction base="string">
      <pattern value="[A-Z]{3}"/>
    </restriction>
  </simpleType>
  <simpleType name="EuroType">
    <restriction base="gml:CurrencyType">
      <pattern value="EU."/>
    </restriction>
  </simpleType>
  <complexType name="MeasureType">
    <simpleContent>
      <extension base="gml:CurrencyType"/>
    </simpleContent>
  </complexType>
  <simpleType name="doubleList">
    <list itemType="double"/>
  </simpleType>
  <simpleType name="SignList">
    <list itemType="gml:SignType"/>
  </simpleType>
  <simpleType name="NullEnumeration">
    <union memberTypes="gml:SignType anyURI">
      <simpleType>
        <restriction base="string">
          <pattern value="other:\w{2,}"/>
        </restriction>
      </simpleType>
    </union>
  </simpleType>
  <simpleType name="PositionType">
    <restriction base="gml:doubleList">
      <minLength value="2"/>
      <maxLength value="3"/>
    </restriction>
  </simpleType>
  <simpleType name="ScaleType">
    <restriction base="double">
      <minExclusive value="0"/>
      <maxInclusive value="1"/>
    </restriction>
  </simpleType>
</schema>"#;

    fn load(xml: &str, options: &LoadOptions) -> Result<VariantTable, LoadError> {
        let doc = Document::parse(xml).unwrap();
        read_variant_table(&doc, options)
    }

    fn chain(table: &VariantTable, local: &str) -> Vec<String> {
        let tag = table.tag_by_local_name(local).unwrap();
        table
            .ancestors(tag)
            .map(|t| table.name(t).unwrap().local_name.clone())
            .collect()
    }

    #[test]
    fn maps_extension_chains() {
        let table = load(GML, &LoadOptions::default()).unwrap();
        assert_eq!(table.target_namespace(), Some("http://www.opengis.net/gml"));
        assert_eq!(
            chain(&table, "PointType"),
            vec![
                "PointType",
                "AbstractGeometricPrimitiveType",
                "AbstractGeometryType",
                "AbstractGMLType",
                "anyType"
            ]
        );
        assert_eq!(table.name(table.root()), Some(&*XS_ANY_TYPE_NAME));
    }

    #[test]
    fn builtin_bases_attach_to_root() {
        let table = load(GML, &LoadOptions::default()).unwrap();
        assert_eq!(chain(&table, "CodeType"), vec!["CodeType", "anyType"]);
        assert_eq!(chain(&table, "doubleList"), vec!["doubleList", "anyType"]);
    }

    fn xs(local: &str) -> QName {
        QName::with_namespace(XS_NAMESPACE, local)
    }

    #[test]
    fn reads_list_and_union_varieties() {
        let table = load(GML, &LoadOptions::default()).unwrap();
        let variety = |local: &str| {
            let tag = table.tag_by_local_name(local).unwrap();
            table.get(tag).unwrap().variety.clone()
        };
        let sign = table.tag_by_local_name("SignType").unwrap();

        assert_eq!(variety("doubleList"), Variety::List(TypeRef::Builtin(xs("double"))));
        assert_eq!(variety("SignList"), Variety::List(TypeRef::Variant(sign)));
        assert_eq!(
            variety("NullEnumeration"),
            Variety::Union(vec![
                TypeRef::Variant(sign),
                TypeRef::Builtin(xs("anyURI")),
                TypeRef::Builtin(XS_ANY_SIMPLE_TYPE_NAME.clone()),
            ])
        );
        assert_eq!(variety("SignType"), Variety::Atomic);
        assert_eq!(variety("CodeType"), Variety::Atomic);
    }

    #[test]
    fn restrictions_of_lists_keep_their_base() {
        let table = load(GML, &LoadOptions::default()).unwrap();
        assert_eq!(
            chain(&table, "PositionType"),
            vec!["PositionType", "doubleList", "anyType"]
        );
        let position = table.tag_by_local_name("PositionType").unwrap();
        assert_eq!(table.get(position).unwrap().variety, Variety::Atomic);
        assert!(table.facets(position).unwrap().check_list("1 2", 2).is_empty());
        assert_eq!(table.facets(position).unwrap().check_list("1", 1).len(), 1);
    }

    #[test]
    fn bound_facets_are_collected() {
        let table = load(GML, &LoadOptions::default()).unwrap();
        let scale = table.tag_by_local_name("ScaleType").unwrap();
        let facets = table.facets(scale).unwrap();
        let min = facets.min_bound().unwrap();
        assert_eq!((min.as_str(), min.is_inclusive()), ("0", false));
        let max = facets.max_bound().unwrap();
        assert_eq!((max.as_str(), max.is_inclusive()), ("1", true));
    }

    #[test]
    fn restriction_facets_are_collected_per_step() {
        let table = load(GML, &LoadOptions::default()).unwrap();
        let sign = table.tag_by_local_name("SignType").unwrap();
        assert_eq!(table.facets(sign).unwrap().enumeration(), &["-", "+"]);

        let euro = table.tag_by_local_name("EuroType").unwrap();
        assert_eq!(chain(&table, "EuroType"), vec!["EuroType", "CurrencyType", "anyType"]);
        assert_eq!(
            table.facets(euro).unwrap().pattern().unwrap().as_str(),
            "EU."
        );
        let currency = table.base(euro).unwrap();
        assert_eq!(
            table.facets(currency).unwrap().pattern().unwrap().as_str(),
            "[A-Z]{3}"
        );
    }

    #[test]
    fn skipping_simple_types_reattaches_simple_content() {
        let options = LoadOptions {
            simple_types: IncludeSimpleTypes::No,
            ..LoadOptions::default()
        };
        let table = load(GML, &options).unwrap();
        assert!(table.tag_by_local_name("SignType").is_none());
        assert_eq!(chain(&table, "MeasureType"), vec!["MeasureType", "anyType"]);
    }

    const FOREIGN: &str = r#"<schema xmlns="http://www.w3.org/2001/XMLSchema"
        xmlns:ows="http://www.opengis.net/ows/1.1"
        xmlns:wmts="http://www.opengis.net/wmts/1.0"
        targetNamespace="http://www.opengis.net/wmts/1.0">
  <complexType name="LayerType">
    <complexContent>
      <extension base="ows:DatasetDescriptionSummaryBaseType"/>
    </complexContent>
  </complexType>
</schema>"#;

    #[test]
    fn foreign_base_is_denied_by_default() {
        let err = load(FOREIGN, &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::ForeignBase { base, .. } if base.local_name == "DatasetDescriptionSummaryBaseType"
        ));
    }

    #[test]
    fn foreign_base_can_be_tolerated() {
        for action in [ForeignBaseAction::Warn, ForeignBaseAction::Allow] {
            let options = LoadOptions {
                foreign_base: action,
                ..LoadOptions::default()
            };
            let table = load(FOREIGN, &options).unwrap();
            assert_eq!(chain(&table, "LayerType"), vec!["LayerType", "anyType"]);
        }
    }

    const TYPO: &str = r#"<schema xmlns="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">
  <simpleType name="Label"><restriction base="strng"/></simpleType>
  <simpleType name="Labels"><list itemType="strng"/></simpleType>
</schema>"#;

    #[test]
    fn unknown_builtin_is_denied_by_default() {
        let err = load(TYPO, &LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::UnknownBuiltin { variant, name }
                if variant.local_name == "Label" && name == xs("strng")
        ));
    }

    #[test]
    fn unknown_builtin_can_be_tolerated() {
        for action in [ForeignBaseAction::Warn, ForeignBaseAction::Allow] {
            let options = LoadOptions {
                foreign_base: action,
                ..LoadOptions::default()
            };
            let table = load(TYPO, &options).unwrap();
            assert_eq!(chain(&table, "Label"), vec!["Label", "anyType"]);
            let labels = table.tag_by_local_name("Labels").unwrap();
            assert_eq!(
                table.get(labels).unwrap().variety,
                Variety::List(TypeRef::Builtin(XS_ANY_SIMPLE_TYPE_NAME.clone()))
            );
        }
    }

    #[test]
    fn unresolved_prefix_is_reported() {
        let xml = r#"<schema xmlns="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">
  <complexType name="A"><complexContent><extension base="nope:B"/></complexContent></complexType>
</schema>"#;
        let err = load(xml, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::NamePrefixNotResolved(p) if p == "nope"));
    }

    #[test]
    fn undeclared_local_base_is_a_table_error() {
        let xml = r#"<schema xmlns="http://www.w3.org/2001/XMLSchema" xmlns:t="urn:t" targetNamespace="urn:t">
  <complexType name="A"><complexContent><extension base="t:Missing"/></complexContent></complexType>
</schema>"#;
        let err = load(xml, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Table(TableError::UnknownBase { .. })));
    }

    #[test]
    fn rejects_non_schema_documents() {
        let err = load("<root/>", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::NotASchema(n) if n == "root"));
    }

    #[test]
    fn unnamed_top_level_type_is_an_error() {
        let xml = r#"<schema xmlns="http://www.w3.org/2001/XMLSchema"><complexType/></schema>"#;
        let err = load(xml, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::MissingName("complexType")));
    }
}
