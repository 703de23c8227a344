//! RDF naming constants and the typed-literal tag set.

use strum::Display;

/// Property name of the resource-table IRI column.
pub const IRI: &str = "iri";
/// Property name of the literal-table serial id column.
pub const ID: &str = "id";
/// Property name of the predicate resource id carried on triple tables.
pub const PID: &str = "pid";

pub const RESOURCE_TABLE_SUFFIX: &str = "_r";
pub const LITERAL_TABLE_SUFFIX: &str = "_l";
pub const RESOURCE_TRIPLE_TABLE_SUFFIX: &str = "_rt";
pub const LITERAL_TRIPLE_TABLE_SUFFIX: &str = "_lt";

/// The XML Schema namespace used to recognize typed literals.
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

pub fn resource_table_name(graph: &str) -> String {
    format!("{graph}{RESOURCE_TABLE_SUFFIX}")
}

pub fn literal_table_name(graph: &str) -> String {
    format!("{graph}{LITERAL_TABLE_SUFFIX}")
}

pub fn resource_triple_table_name(graph: &str) -> String {
    format!("{graph}{RESOURCE_TRIPLE_TABLE_SUFFIX}")
}

pub fn literal_triple_table_name(graph: &str) -> String {
    format!("{graph}{LITERAL_TRIPLE_TABLE_SUFFIX}")
}

/// Discriminator stored in the `_type` byte of an RDF variant value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "camelCase")]
#[repr(u8)]
pub enum XsdTag {
    Untyped = 0,
    Integer = 1,
    Double = 2,
    Decimal = 3,
    Boolean = 4,
    Date = 5,
    DateTime = 6,
    NonNegativeInteger = 7,
    PositiveInteger = 8,
    Float = 9,
}

impl XsdTag {
    /// Maps a datatype IRI to its tag. IRIs outside the XSD namespace and
    /// unknown XSD types fall back to [`XsdTag::Untyped`].
    pub fn from_datatype_iri(iri: &str) -> XsdTag {
        let Some(local) = iri.strip_prefix(XSD) else {
            return XsdTag::Untyped;
        };
        match local {
            "integer" => XsdTag::Integer,
            "double" => XsdTag::Double,
            "decimal" => XsdTag::Decimal,
            "boolean" => XsdTag::Boolean,
            "date" => XsdTag::Date,
            "dateTime" => XsdTag::DateTime,
            "nonNegativeInteger" => XsdTag::NonNegativeInteger,
            "positiveInteger" => XsdTag::PositiveInteger,
            "float" => XsdTag::Float,
            _ => XsdTag::Untyped,
        }
    }

    pub fn from_u8(tag: u8) -> Option<XsdTag> {
        match tag {
            0 => Some(XsdTag::Untyped),
            1 => Some(XsdTag::Integer),
            2 => Some(XsdTag::Double),
            3 => Some(XsdTag::Decimal),
            4 => Some(XsdTag::Boolean),
            5 => Some(XsdTag::Date),
            6 => Some(XsdTag::DateTime),
            7 => Some(XsdTag::NonNegativeInteger),
            8 => Some(XsdTag::PositiveInteger),
            9 => Some(XsdTag::Float),
            _ => None,
        }
    }
}

/// A dynamically typed RDF literal: the tag plus the lexical form's bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RdfValue {
    pub tag: XsdTag,
    pub bytes: Vec<u8>,
}

impl RdfValue {
    pub fn new(tag: XsdTag, lexical: &str) -> RdfValue {
        RdfValue {
            tag,
            bytes: lexical.as_bytes().to_vec(),
        }
    }

    pub fn lexical(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datatype_iri_mapping() {
        assert_eq!(
            XsdTag::from_datatype_iri("http://www.w3.org/2001/XMLSchema#integer"),
            XsdTag::Integer
        );
        assert_eq!(
            XsdTag::from_datatype_iri("http://www.w3.org/2001/XMLSchema#dateTime"),
            XsdTag::DateTime
        );
        assert_eq!(
            XsdTag::from_datatype_iri("http://example.org/custom"),
            XsdTag::Untyped
        );
    }

    #[test]
    fn tag_byte_round_trip() {
        for tag in [XsdTag::Untyped, XsdTag::Integer, XsdTag::Float] {
            assert_eq!(XsdTag::from_u8(tag as u8), Some(tag));
        }
        assert_eq!(XsdTag::from_u8(200), None);
    }

    #[test]
    fn child_table_names_use_fixed_suffixes() {
        assert_eq!(resource_table_name("G"), "G_r");
        assert_eq!(literal_table_name("G"), "G_l");
        assert_eq!(resource_triple_table_name("G"), "G_rt");
        assert_eq!(literal_triple_table_name("G"), "G_lt");
    }
}
