//! Property codec: typed property values to and from their wire strings.
//!
//! Numeric types travel as comma-joined components (`"1,0,0"`). Everything
//! else is an open string type and passes through unchanged.

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;
use std::fmt;

use crate::error::CodecError;

/// Declared type of a property value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Vector3,
    /// Four-component 2D transform (scale/offset pairs).
    Transform2d,
    /// RGB with each channel in `[0, 1]`.
    Color3,
    /// Position plus optional rotation, at least three components.
    Frame,
    Number,
    Boolean,
    String,
    /// Named enum-like string type such as `Material` or `BrickColor`.
    Enum(String),
}

impl PropertyType {
    /// Parse a declared type name, case-insensitively.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "vector3" => Self::Vector3,
            "udim2" | "transform2d" => Self::Transform2d,
            "color3" => Self::Color3,
            "cframe" | "frame" => Self::Frame,
            "number" | "float" | "double" | "int" => Self::Number,
            "boolean" | "bool" => Self::Boolean,
            "string" => Self::String,
            "material" | "material-enum" | "materialenum" => Self::Enum("Material".into()),
            "brickcolor" => Self::Enum("BrickColor".into()),
            _ => Self::Enum(name.trim().to_string()),
        }
    }

    /// Name used on the wire when sending values back to the client.
    pub fn canonical_name(&self) -> &str {
        match self {
            Self::Vector3 => "Vector3",
            Self::Transform2d => "UDim2",
            Self::Color3 => "Color3",
            Self::Frame => "CFrame",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Enum(kind) => kind,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// A decoded property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Vector3([f64; 3]),
    Transform2d([f64; 4]),
    Color3([f64; 3]),
    Frame(Vec<f64>),
    Number(f64),
    Boolean(bool),
    String(String),
    Enum { kind: String, value: String },
}

impl PropertyValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Vector3(_) => PropertyType::Vector3,
            Self::Transform2d(_) => PropertyType::Transform2d,
            Self::Color3(_) => PropertyType::Color3,
            Self::Frame(_) => PropertyType::Frame,
            Self::Number(_) => PropertyType::Number,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::String(_) => PropertyType::String,
            Self::Enum { kind, .. } => PropertyType::Enum(kind.clone()),
        }
    }

    /// Canonical wire string.
    pub fn encode(&self) -> String {
        match self {
            Self::Vector3(c) | Self::Color3(c) => join(c),
            Self::Transform2d(c) => join(c),
            Self::Frame(c) => join(c),
            Self::Number(n) => n.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::String(s) => s.clone(),
            Self::Enum { value, .. } => value.clone(),
        }
    }
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PropertyValue", 2)?;
        state.serialize_field("type", self.property_type().canonical_name())?;
        state.serialize_field("value", &self.encode())?;
        state.end()
    }
}

fn join(components: &[f64]) -> String {
    components
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a wire string for the given type.
pub fn decode(ty: &PropertyType, wire: &str) -> Result<PropertyValue, CodecError> {
    let name = ty.canonical_name();
    match ty {
        PropertyType::Vector3 => Ok(PropertyValue::Vector3(fixed::<3>(name, wire)?)),
        PropertyType::Transform2d => Ok(PropertyValue::Transform2d(fixed::<4>(name, wire)?)),
        PropertyType::Color3 => {
            let rgb = fixed::<3>(name, wire)?;
            if rgb.iter().any(|c| !(0.0..=1.0).contains(c)) {
                return Err(CodecError::invalid(
                    name,
                    wire,
                    "each channel must be within [0, 1]",
                ));
            }
            Ok(PropertyValue::Color3(rgb))
        }
        PropertyType::Frame => {
            let parts = components(name, wire)?;
            if parts.len() < 3 {
                return Err(CodecError::invalid(
                    name,
                    wire,
                    format!("expected at least 3 components, got {}", parts.len()),
                ));
            }
            Ok(PropertyValue::Frame(parts))
        }
        PropertyType::Number => Ok(PropertyValue::Number(number(name, wire)?)),
        PropertyType::Boolean => match wire.trim() {
            "true" => Ok(PropertyValue::Boolean(true)),
            "false" => Ok(PropertyValue::Boolean(false)),
            _ => Err(CodecError::invalid(name, wire, "expected 'true' or 'false'")),
        },
        PropertyType::String => Ok(PropertyValue::String(wire.to_string())),
        PropertyType::Enum(kind) => Ok(PropertyValue::Enum {
            kind: kind.clone(),
            value: wire.to_string(),
        }),
    }
}

/// Decode a JSON value, accepting native numbers and booleans as well as strings.
pub fn decode_json(ty: &PropertyType, value: &Value) -> Result<PropertyValue, CodecError> {
    match value {
        Value::String(s) => decode(ty, s),
        Value::Bool(b) if *ty == PropertyType::Boolean => Ok(PropertyValue::Boolean(*b)),
        Value::Number(n) => decode(ty, &n.to_string()),
        Value::Bool(b) => decode(ty, &b.to_string()),
        other => Err(CodecError::invalid(
            ty.canonical_name(),
            &other.to_string(),
            "value must be a string, number or boolean",
        )),
    }
}

fn components(ty: &str, wire: &str) -> Result<Vec<f64>, CodecError> {
    wire.split(',').map(|part| number(ty, part)).collect()
}

fn fixed<const N: usize>(ty: &str, wire: &str) -> Result<[f64; N], CodecError> {
    let parts = components(ty, wire)?;
    parts.try_into().map_err(|parts: Vec<f64>| {
        CodecError::invalid(
            ty,
            wire,
            format!("expected {N} components, got {}", parts.len()),
        )
    })
}

fn number(ty: &str, raw: &str) -> Result<f64, CodecError> {
    let n: f64 = raw
        .trim()
        .parse()
        .map_err(|_| CodecError::invalid(ty, raw, "not a number"))?;
    if !n.is_finite() {
        return Err(CodecError::invalid(ty, raw, "number must be finite"));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(ty: PropertyType, wire: &str) {
        let value = decode(&ty, wire).unwrap();
        let again = decode(&ty, &value.encode()).unwrap();
        assert_eq!(value, again, "roundtrip for {ty}");
    }

    #[test]
    fn every_type_roundtrips() {
        roundtrip(PropertyType::Vector3, "10, 1.5, -10");
        roundtrip(PropertyType::Transform2d, "0.5,0,0.25,10");
        roundtrip(PropertyType::Color3, "1,0,0.333");
        roundtrip(PropertyType::Frame, "0,5,0,1,0,0,0,1,0,0,0,1");
        roundtrip(PropertyType::Number, "3.25");
        roundtrip(PropertyType::Boolean, "false");
        roundtrip(PropertyType::String, "Hello, world");
        roundtrip(PropertyType::parse("Material"), "Neon");
    }

    #[test]
    fn color_decodes_components() {
        let value = decode(&PropertyType::parse("Color3"), "1,0,0").unwrap();
        assert_eq!(value, PropertyValue::Color3([1.0, 0.0, 0.0]));
        assert_eq!(value.encode(), "1,0,0");
    }

    #[test]
    fn color_out_of_range_is_rejected() {
        let err = decode(&PropertyType::Color3, "255,0,0").unwrap_err();
        assert!(err.to_string().contains("[0, 1]"));
    }

    #[test]
    fn component_counts_are_enforced() {
        assert!(decode(&PropertyType::Vector3, "1,2").is_err());
        assert!(decode(&PropertyType::Vector3, "1,2,3,4").is_err());
        assert!(decode(&PropertyType::Transform2d, "1,2,3").is_err());
        assert!(decode(&PropertyType::Frame, "1,2").is_err());
        assert!(decode(&PropertyType::Frame, "1,2,3").is_ok());
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        assert!(decode(&PropertyType::Number, "NaN").is_err());
        assert!(decode(&PropertyType::Number, "inf").is_err());
        assert!(decode(&PropertyType::Vector3, "1,abc,3").is_err());
    }

    #[test]
    fn boolean_accepts_native_and_literal() {
        assert_eq!(
            decode_json(&PropertyType::Boolean, &json!(true)).unwrap(),
            PropertyValue::Boolean(true)
        );
        assert_eq!(
            decode_json(&PropertyType::Boolean, &json!("false")).unwrap(),
            PropertyValue::Boolean(false)
        );
        assert!(decode(&PropertyType::Boolean, "yes").is_err());
    }

    #[test]
    fn native_numbers_decode() {
        assert_eq!(
            decode_json(&PropertyType::Number, &json!(0.5)).unwrap(),
            PropertyValue::Number(0.5)
        );
    }

    #[test]
    fn unknown_types_are_open_strings() {
        let ty = PropertyType::parse("Font");
        assert_eq!(ty, PropertyType::Enum("Font".into()));
        let value = decode(&ty, "SourceSans").unwrap();
        assert_eq!(value.property_type().canonical_name(), "Font");
    }

    #[test]
    fn serializes_as_typed_wire_object() {
        let value = PropertyValue::Vector3([10.0, 1.0, 10.0]);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({"type": "Vector3", "value": "10,1,10"})
        );
    }
}
