//! Dynamically typed values produced by binding
//!
//! Every bound parameter materializes as a [`Value`]. Converters for types the
//! engine does not know natively produce [`Value::Custom`], which carries a shared
//! payload plus the text it was parsed from.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A bound parameter value
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Constant of a declared enum type
    Enum {
        type_name: String,
        constant: String,
    },
    /// Materialized bean-option group
    Bean(Bean),
    List(Vec<Value>),
    /// Value produced by a registered converter
    Custom {
        type_name: String,
        display: String,
        payload: Arc<dyn Any + Send + Sync>,
    },
}

/// Nested option object with its fields in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct Bean {
    pub type_name: String,
    pub fields: Vec<(String, Value)>,
}

impl Bean {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

impl Value {
    /// Wrap a converter result that has no native variant
    pub fn custom<T: Any + Send + Sync>(
        type_name: impl Into<String>,
        display: impl Into<String>,
        payload: T,
    ) -> Self {
        Self::Custom {
            type_name: type_name.into(),
            display: display.into(),
            payload: Arc::new(payload),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Enum { constant, .. } => Some(constant),
            _ => None,
        }
    }

    pub fn as_bean(&self) -> Option<&Bean> {
        match self {
            Self::Bean(bean) => Some(bean),
            _ => None,
        }
    }

    /// Borrow the payload of a [`Value::Custom`] as a concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Custom { payload, .. } => payload.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Short type label used in error messages
    pub fn type_label(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(_) => "bool".to_string(),
            Self::Int(_) => "int".to_string(),
            Self::Float(_) => "float".to_string(),
            Self::Text(_) => "text".to_string(),
            Self::Enum { type_name, .. } => format!("enum {type_name}"),
            Self::Bean(bean) => bean.type_name.clone(),
            Self::List(_) => "list".to_string(),
            Self::Custom { type_name, .. } => type_name.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (
                Self::Enum {
                    type_name: ta,
                    constant: ca,
                },
                Self::Enum {
                    type_name: tb,
                    constant: cb,
                },
            ) => ta == tb && ca == cb,
            (Self::Bean(a), Self::Bean(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (
                Self::Custom {
                    type_name: ta,
                    display: da,
                    ..
                },
                Self::Custom {
                    type_name: tb,
                    display: db,
                    ..
                },
            ) => ta == tb && da == db,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::Text(s) => write!(f, "Text({s:?})"),
            Self::Enum {
                type_name,
                constant,
            } => write!(f, "{type_name}::{constant}"),
            Self::Bean(bean) => write!(f, "{bean:?}"),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Custom {
                type_name, display, ..
            } => write!(f, "{type_name}({display:?})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Enum { constant, .. } => write!(f, "{constant}"),
            Self::Bean(bean) => {
                write!(f, "{}(", bean.type_name)?;
                for (i, (name, value)) in bean.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                write!(f, ")")
            }
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Custom { display, .. } => write!(f, "{display}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Enum { constant, .. } => serializer.serialize_str(constant),
            Self::Custom { display, .. } => serializer.serialize_str(display),
            Self::Bean(bean) => {
                let mut map = serializer.serialize_map(Some(bean.fields.len()))?;
                for (name, value) in &bean.fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}
