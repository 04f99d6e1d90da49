use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Behavioural parameters of one class of travelers (mean values).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_types")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub comment: String,
    pub alpha_ti: f64,
    pub alpha_tp: f64,
    pub beta: f64,
    pub delta: f64,
    pub gamma: f64,
    pub t_star: f64,
    pub departure_mu: f64,
    pub route_mu: f64,
    pub mode_mu: f64,
    pub penalty_tp: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
