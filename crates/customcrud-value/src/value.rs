use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::number::Number;

/// Structural type of a `DynamicValue`.
///
/// Two values share a type when their shapes match all the way down; this is
/// what decides whether a collection may stay a `List`/`Set` or must degrade
/// to a `Tuple`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Type not yet determined (null, unknown, or the element of an empty collection).
    Dynamic,
    String,
    Number,
    Bool,
    List(Box<ValueType>),
    Set(Box<ValueType>),
    Tuple(Vec<ValueType>),
    Object(BTreeMap<String, ValueType>),
}

/// Runtime value of the host configuration language.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicValue {
    #[default]
    Null,
    /// Not yet resolved by the host's planning phase.
    Unknown,
    String(String),
    Number(Number),
    Bool(bool),
    List {
        element_type: ValueType,
        elements: Vec<DynamicValue>,
    },
    Set {
        element_type: ValueType,
        elements: Vec<DynamicValue>,
    },
    Tuple(Vec<DynamicValue>),
    Object(BTreeMap<String, DynamicValue>),
}

impl DynamicValue {
    /// Builds a list, degrading to a tuple when element types differ.
    pub fn list(elements: Vec<DynamicValue>) -> Self {
        match uniform_element_type(&elements) {
            Some(element_type) => Self::List {
                element_type,
                elements,
            },
            None => Self::Tuple(elements),
        }
    }

    /// Builds a set, dropping duplicate elements (first occurrence wins) and
    /// degrading to a tuple when element types differ.
    pub fn set(elements: Vec<DynamicValue>) -> Self {
        let mut unique: Vec<DynamicValue> = Vec::with_capacity(elements.len());
        for element in elements {
            if !unique.contains(&element) {
                unique.push(element);
            }
        }
        match uniform_element_type(&unique) {
            Some(element_type) => Self::Set {
                element_type,
                elements: unique,
            },
            None => Self::Tuple(unique),
        }
    }

    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, DynamicValue)>,
    {
        Self::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn number(value: impl Into<Number>) -> Self {
        Self::Number(value.into())
    }

    /// Returns the structural type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null | Self::Unknown => ValueType::Dynamic,
            Self::String(_) => ValueType::String,
            Self::Number(_) => ValueType::Number,
            Self::Bool(_) => ValueType::Bool,
            Self::List { element_type, .. } => ValueType::List(Box::new(element_type.clone())),
            Self::Set { element_type, .. } => ValueType::Set(Box::new(element_type.clone())),
            Self::Tuple(elements) => {
                ValueType::Tuple(elements.iter().map(DynamicValue::value_type).collect())
            }
            Self::Object(fields) => ValueType::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.value_type()))
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Returns true when the value carries no usable content yet.
    pub fn is_null_or_unknown(&self) -> bool {
        matches!(self, Self::Null | Self::Unknown)
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, DynamicValue>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Looks up an object attribute.
    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.as_object().and_then(|fields| fields.get(key))
    }

    /// Returns the elements of any collection kind.
    pub fn elements(&self) -> Option<&[DynamicValue]> {
        match self {
            Self::List { elements, .. } | Self::Set { elements, .. } | Self::Tuple(elements) => {
                Some(elements.as_slice())
            }
            _ => None,
        }
    }
}

impl PartialEq for DynamicValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) | (Self::Unknown, Self::Unknown) => true,
            (Self::String(left), Self::String(right)) => left == right,
            (Self::Number(left), Self::Number(right)) => left == right,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (
                Self::List {
                    element_type: left_type,
                    elements: left,
                },
                Self::List {
                    element_type: right_type,
                    elements: right,
                },
            ) => left_type == right_type && left == right,
            (
                Self::Set {
                    element_type: left_type,
                    elements: left,
                },
                Self::Set {
                    element_type: right_type,
                    elements: right,
                },
            ) => {
                left_type == right_type
                    && left.len() == right.len()
                    && left.iter().all(|element| right.contains(element))
            }
            (Self::Tuple(left), Self::Tuple(right)) => left == right,
            (Self::Object(left), Self::Object(right)) => left == right,
            _ => false,
        }
    }
}

impl From<&str> for DynamicValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DynamicValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for DynamicValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for DynamicValue {
    fn from(value: f64) -> Self {
        Self::Number(Number::Float(value))
    }
}

impl From<i64> for DynamicValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

fn uniform_element_type(elements: &[DynamicValue]) -> Option<ValueType> {
    let Some(first) = elements.first() else {
        return Some(ValueType::Dynamic);
    };
    let element_type = first.value_type();
    elements[1..]
        .iter()
        .all(|element| element.value_type() == element_type)
        .then_some(element_type)
}
