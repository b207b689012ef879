use sea_orm::entity::prelude::*;

/// Co-appearance edge: actors `a` and `b` (a < b, enforced by a table check
/// constraint) appeared together in series `e`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "graph_tv")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub a: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub b: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub e: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
