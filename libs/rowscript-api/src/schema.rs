use crate::value::TypeKind;

/// A single field in a row schema.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TypeKind,
    /// Display length hint, -1 = unspecified.
    #[serde(default = "unspecified")]
    pub length: i32,
    /// Precision hint, -1 = unspecified.
    #[serde(default = "unspecified")]
    pub precision: i32,
}

fn unspecified() -> i32 {
    -1
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            length: -1,
            precision: -1,
        }
    }
}

/// Ordered field list. Field position determines its index in `Row`.
///
/// Field names are unique within a schema; order is stable and defines the
/// row's positional encoding.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct RowSchema {
    pub fields: Vec<FieldDescriptor>,
}

impl RowSchema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    pub fn width(&self) -> usize {
        self.fields.len()
    }

    /// Position of the named field, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}
