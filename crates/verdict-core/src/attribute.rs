use serde::{Deserialize, Serialize};

use crate::value::{Type, Value};

/// A named, typed attribute slot. Two attributes are the same attribute
/// exactly when both id and type agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    id: String,
    ty: Type,
}

impl Attribute {
    pub fn new(id: impl Into<String>, ty: Type) -> Self {
        Attribute { id: id.into(), ty }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ty(&self) -> Type {
        self.ty
    }
}

/// An evaluated obligation entry: the attribute id together with the value
/// its expression produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub id: String,
    pub value: Value,
}

impl AttributeValue {
    pub fn new(id: impl Into<String>, value: Value) -> Self {
        AttributeValue {
            id: id.into(),
            value,
        }
    }
}
