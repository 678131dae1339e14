//! Catalog entities
//!
//! The catalog holds exactly three kinds of rows:
//! - `Model`: a vehicle type/trim
//! - `Part`: a replacement component identified by its part number
//! - `Link`: a model ↔ part compatibility row, optionally marked primary

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Searchable entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Model,
    Part,
}

impl EntityKind {
    /// Get the string representation of the entity kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Model => "model",
            EntityKind::Part => "part",
        }
    }
}

impl FromStr for EntityKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "model" | "models" | "car" | "cars" => Ok(EntityKind::Model),
            "part" | "parts" => Ok(EntityKind::Part),
            _ => Err(crate::Error::InvalidInput(format!("Unknown entity kind: {}", s))),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

macro_rules! row_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map($name)
            }
        }
    };
}

row_id!(ModelId);
row_id!(PartId);

/// A vehicle model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    pub name: String,
}

/// A replacement part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub part_number: String,
    pub name: String,
}

/// A compatibility row between a model and a part.
///
/// `is_primary` marks the model the part was designed for. A part has at
/// most one primary link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub model_id: ModelId,
    pub part_id: PartId,
    pub is_primary: bool,
}

/// A search hit of either kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    Model(Model),
    Part(Part),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Model(_) => EntityKind::Model,
            Entity::Part(_) => EntityKind::Part,
        }
    }

    /// Raw row id, regardless of kind
    pub fn id(&self) -> i64 {
        match self {
            Entity::Model(m) => m.id.0,
            Entity::Part(p) => p.id.0,
        }
    }

    /// Human-readable label (`"Brake Pad (BP-1001)"` for parts)
    pub fn label(&self) -> String {
        match self {
            Entity::Model(m) => m.name.clone(),
            Entity::Part(p) => format!("{} ({})", p.name, p.part_number),
        }
    }
}

/// A part compatible with some model, as seen from that model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartLink {
    pub part_id: PartId,
    pub part_name: String,
    pub part_number: String,
    pub is_primary: bool,
}

/// A model compatible with some part, as seen from that part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLink {
    pub model_id: ModelId,
    pub model_name: String,
    pub is_primary: bool,
}
