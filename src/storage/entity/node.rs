use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Centroids (zones) and crossings (intersections) share one table so that
/// links can reference either through a single internal id.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "nodes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i64,
    pub kind: String, // centroid / crossing
    pub name: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Centroid,
    Crossing,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Centroid => "centroid",
            NodeKind::Crossing => "crossing",
        }
    }

    /// The kind sharing this kind's natural-id namespace.
    pub fn other(&self) -> NodeKind {
        match self {
            NodeKind::Centroid => NodeKind::Crossing,
            NodeKind::Crossing => NodeKind::Centroid,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "centroid" => Ok(NodeKind::Centroid),
            "crossing" => Ok(NodeKind::Crossing),
            other => Err(format!("unknown node kind: {}", other)),
        }
    }
}
