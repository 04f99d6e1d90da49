use crate::storage::entity::function::{self, Entity as Function};
use crate::storage::entity::function_set_function::{self, Entity as FunctionSetFunction};
use crate::storage::entity::link::{self, Entity as Link};
use crate::storage::entity::network_link::{self, Entity as NetworkLink};
use crate::storage::entity::network_node::{self, Entity as NetworkNode};
use crate::storage::entity::node::{self, Entity as Node, NodeKind};
use crate::storage::entity::od_pair::{self, Entity as OdPair};
use crate::storage::entity::policy::{self, Entity as Policy};
use crate::storage::repository::rows_per_statement;
use sea_orm::sea_query::{Expr, Query, SelectStatement};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, NotSet, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub user_id: i64,
    pub name: String,
    pub x: f64,
    pub y: f64,
}

/// Link row with references already resolved to internal ids.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub user_id: i64,
    pub name: String,
    pub origin: i32,
    pub destination: i32,
    pub vdf_id: i32,
    pub lanes: f64,
    pub length: f64,
    pub speed: f64,
    pub capacity: f64,
}

fn network_nodes(network_id: i32) -> SelectStatement {
    Query::select()
        .column(network_node::Column::NodeId)
        .from(NetworkNode)
        .and_where(network_node::Column::NetworkId.eq(network_id))
        .to_owned()
}

fn network_links(network_id: i32) -> SelectStatement {
    Query::select()
        .column(network_link::Column::LinkId)
        .from(NetworkLink)
        .and_where(network_link::Column::NetworkId.eq(network_id))
        .to_owned()
}

fn set_functions(function_set_id: i32) -> SelectStatement {
    Query::select()
        .column(function_set_function::Column::FunctionId)
        .from(FunctionSetFunction)
        .and_where(function_set_function::Column::FunctionSetId.eq(function_set_id))
        .to_owned()
}

pub struct NetworkRepository;

impl NetworkRepository {
    // ----- scoped reads -----

    pub async fn nodes<C: ConnectionTrait>(
        db: &C,
        network_id: i32,
        kind: NodeKind,
    ) -> Result<Vec<node::Model>, DbErr> {
        Node::find()
            .filter(node::Column::Kind.eq(kind.as_str()))
            .filter(node::Column::Id.in_subquery(network_nodes(network_id)))
            .order_by_asc(node::Column::UserId)
            .all(db)
            .await
    }

    pub async fn links<C: ConnectionTrait>(
        db: &C,
        network_id: i32,
    ) -> Result<Vec<link::Model>, DbErr> {
        Link::find()
            .filter(link::Column::Id.in_subquery(network_links(network_id)))
            .order_by_asc(link::Column::UserId)
            .all(db)
            .await
    }

    pub async fn functions<C: ConnectionTrait>(
        db: &C,
        function_set_id: i32,
    ) -> Result<Vec<function::Model>, DbErr> {
        Function::find()
            .filter(function::Column::Id.in_subquery(set_functions(function_set_id)))
            .order_by_asc(function::Column::UserId)
            .all(db)
            .await
    }

    pub async fn count_links<C: ConnectionTrait>(db: &C, network_id: i32) -> Result<u64, DbErr> {
        use sea_orm::PaginatorTrait;
        NetworkLink::find()
            .filter(network_link::Column::NetworkId.eq(network_id))
            .count(db)
            .await
    }

    pub async fn node_user_ids<C: ConnectionTrait>(
        db: &C,
        network_id: i32,
        kind: NodeKind,
    ) -> Result<HashSet<i64>, DbErr> {
        let ids = Node::find()
            .select_only()
            .column(node::Column::UserId)
            .filter(node::Column::Kind.eq(kind.as_str()))
            .filter(node::Column::Id.in_subquery(network_nodes(network_id)))
            .into_tuple::<i64>()
            .all(db)
            .await?;
        Ok(ids.into_iter().collect())
    }

    /// user_id -> internal id of the nodes of one kind, or of both when
    /// `kind` is `None`.
    pub async fn node_id_map<C: ConnectionTrait>(
        db: &C,
        network_id: i32,
        kind: Option<NodeKind>,
    ) -> Result<HashMap<i64, i32>, DbErr> {
        let mut query = Node::find()
            .select_only()
            .column(node::Column::UserId)
            .column(node::Column::Id)
            .filter(node::Column::Id.in_subquery(network_nodes(network_id)));
        if let Some(k) = kind {
            query = query.filter(node::Column::Kind.eq(k.as_str()));
        }
        let rows = query.into_tuple::<(i64, i32)>().all(db).await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn function_id_map<C: ConnectionTrait>(
        db: &C,
        function_set_id: i32,
    ) -> Result<HashMap<i64, i32>, DbErr> {
        let rows = Function::find()
            .select_only()
            .column(function::Column::UserId)
            .column(function::Column::Id)
            .filter(function::Column::Id.in_subquery(set_functions(function_set_id)))
            .into_tuple::<(i64, i32)>()
            .all(db)
            .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn link_id_map<C: ConnectionTrait>(
        db: &C,
        network_id: i32,
    ) -> Result<HashMap<i64, i32>, DbErr> {
        let rows = Link::find()
            .select_only()
            .column(link::Column::UserId)
            .column(link::Column::Id)
            .filter(link::Column::Id.in_subquery(network_links(network_id)))
            .into_tuple::<(i64, i32)>()
            .all(db)
            .await?;
        Ok(rows.into_iter().collect())
    }

    // ----- bulk writes -----

    pub async fn insert_nodes<C: ConnectionTrait>(
        db: &C,
        kind: NodeKind,
        rows: Vec<NewNode>,
        chunk_size: usize,
    ) -> Result<usize, DbErr> {
        let total = rows.len();
        let per_stmt = rows_per_statement(chunk_size, 5);
        let mut it = rows.into_iter().peekable();
        while it.peek().is_some() {
            let chunk: Vec<node::ActiveModel> = it
                .by_ref()
                .take(per_stmt)
                .map(|r| node::ActiveModel {
                    id: NotSet,
                    user_id: Set(r.user_id),
                    kind: Set(kind.as_str().to_string()),
                    name: Set(r.name),
                    x: Set(r.x),
                    y: Set(r.y),
                })
                .collect();
            Node::insert_many(chunk).exec_without_returning(db).await?;
        }
        Ok(total)
    }

    pub async fn update_node<C: ConnectionTrait>(
        db: &C,
        id: i32,
        name: &str,
        x: f64,
        y: f64,
    ) -> Result<(), DbErr> {
        Node::update_many()
            .col_expr(node::Column::Name, Expr::value(name.to_string()))
            .col_expr(node::Column::X, Expr::value(x))
            .col_expr(node::Column::Y, Expr::value(y))
            .filter(node::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn insert_functions<C: ConnectionTrait>(
        db: &C,
        rows: Vec<(i64, String, String)>,
        chunk_size: usize,
    ) -> Result<usize, DbErr> {
        let total = rows.len();
        let per_stmt = rows_per_statement(chunk_size, 3);
        let mut it = rows.into_iter().peekable();
        while it.peek().is_some() {
            let chunk: Vec<function::ActiveModel> = it
                .by_ref()
                .take(per_stmt)
                .map(|(user_id, name, expression)| function::ActiveModel {
                    id: NotSet,
                    user_id: Set(user_id),
                    name: Set(name),
                    expression: Set(expression),
                })
                .collect();
            Function::insert_many(chunk).exec_without_returning(db).await?;
        }
        Ok(total)
    }

    pub async fn update_function<C: ConnectionTrait>(
        db: &C,
        id: i32,
        name: &str,
        expression: &str,
    ) -> Result<(), DbErr> {
        Function::update_many()
            .col_expr(function::Column::Name, Expr::value(name.to_string()))
            .col_expr(function::Column::Expression, Expr::value(expression.to_string()))
            .filter(function::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn insert_links<C: ConnectionTrait>(
        db: &C,
        rows: Vec<NewLink>,
        chunk_size: usize,
    ) -> Result<usize, DbErr> {
        let total = rows.len();
        let per_stmt = rows_per_statement(chunk_size, 9);
        let mut it = rows.into_iter().peekable();
        while it.peek().is_some() {
            let chunk: Vec<link::ActiveModel> = it
                .by_ref()
                .take(per_stmt)
                .map(|r| link::ActiveModel {
                    id: NotSet,
                    user_id: Set(r.user_id),
                    name: Set(r.name),
                    origin: Set(r.origin),
                    destination: Set(r.destination),
                    vdf_id: Set(r.vdf_id),
                    lanes: Set(r.lanes),
                    length: Set(r.length),
                    speed: Set(r.speed),
                    capacity: Set(r.capacity),
                })
                .collect();
            Link::insert_many(chunk).exec_without_returning(db).await?;
        }
        Ok(total)
    }

    /// Deletes links by internal id. Tolls and membership rows go first.
    pub async fn delete_links<C: ConnectionTrait>(
        db: &C,
        ids: &[i32],
        chunk_size: usize,
    ) -> Result<u64, DbErr> {
        let mut deleted = 0;
        for chunk in ids.chunks(rows_per_statement(chunk_size, 1)) {
            Policy::delete_many()
                .filter(policy::Column::LinkId.is_in(chunk.to_vec()))
                .exec(db)
                .await?;
            NetworkLink::delete_many()
                .filter(network_link::Column::LinkId.is_in(chunk.to_vec()))
                .exec(db)
                .await?;
            let res = Link::delete_many()
                .filter(link::Column::Id.is_in(chunk.to_vec()))
                .exec(db)
                .await?;
            deleted += res.rows_affected;
        }
        Ok(deleted)
    }

    // ----- container membership -----

    /// Attaches the unattached nodes whose user_id is in `user_ids` to the network.
    pub async fn attach_nodes<C: ConnectionTrait>(
        db: &C,
        network_id: i32,
        kind: NodeKind,
        user_ids: &[i64],
        chunk_size: usize,
    ) -> Result<usize, DbErr> {
        let mut attached = 0;
        for chunk in user_ids.chunks(rows_per_statement(chunk_size, 1)) {
            let ids = Node::find()
                .select_only()
                .column(node::Column::Id)
                .filter(node::Column::Kind.eq(kind.as_str()))
                .filter(node::Column::UserId.is_in(chunk.to_vec()))
                .filter(node::Column::Id.not_in_subquery(all_network_nodes()))
                .into_tuple::<i32>()
                .all(db)
                .await?;
            attached += ids.len();
            Self::insert_memberships(db, ids, chunk_size, |node_id| network_node::ActiveModel {
                id: NotSet,
                network_id: Set(network_id),
                node_id: Set(node_id),
            })
            .await?;
        }
        Ok(attached)
    }

    pub async fn attach_links<C: ConnectionTrait>(
        db: &C,
        network_id: i32,
        user_ids: &[i64],
        chunk_size: usize,
    ) -> Result<usize, DbErr> {
        let mut attached = 0;
        for chunk in user_ids.chunks(rows_per_statement(chunk_size, 1)) {
            let ids = Link::find()
                .select_only()
                .column(link::Column::Id)
                .filter(link::Column::UserId.is_in(chunk.to_vec()))
                .filter(link::Column::Id.not_in_subquery(all_network_links()))
                .into_tuple::<i32>()
                .all(db)
                .await?;
            attached += ids.len();
            Self::insert_memberships(db, ids, chunk_size, |link_id| network_link::ActiveModel {
                id: NotSet,
                network_id: Set(network_id),
                link_id: Set(link_id),
            })
            .await?;
        }
        Ok(attached)
    }

    pub async fn attach_functions<C: ConnectionTrait>(
        db: &C,
        function_set_id: i32,
        user_ids: &[i64],
        chunk_size: usize,
    ) -> Result<usize, DbErr> {
        let mut attached = 0;
        for chunk in user_ids.chunks(rows_per_statement(chunk_size, 1)) {
            let ids = Function::find()
                .select_only()
                .column(function::Column::Id)
                .filter(function::Column::UserId.is_in(chunk.to_vec()))
                .filter(function::Column::Id.not_in_subquery(all_set_functions()))
                .into_tuple::<i32>()
                .all(db)
                .await?;
            attached += ids.len();
            Self::insert_memberships(db, ids, chunk_size, |function_id| {
                function_set_function::ActiveModel {
                    id: NotSet,
                    function_set_id: Set(function_set_id),
                    function_id: Set(function_id),
                }
            })
            .await?;
        }
        Ok(attached)
    }

    async fn insert_memberships<C, A, F>(
        db: &C,
        ids: Vec<i32>,
        chunk_size: usize,
        build: F,
    ) -> Result<(), DbErr>
    where
        C: ConnectionTrait,
        A: sea_orm::ActiveModelTrait,
        <A::Entity as EntityTrait>::Model: sea_orm::IntoActiveModel<A>,
        F: Fn(i32) -> A,
    {
        for chunk in ids.chunks(rows_per_statement(chunk_size, 2)) {
            let models: Vec<A> = chunk.iter().copied().map(&build).collect();
            <A::Entity as EntityTrait>::insert_many(models)
                .exec_without_returning(db)
                .await?;
        }
        Ok(())
    }

    // ----- orphans -----

    /// Removes nodes of `kind` that belong to no network (leftovers of
    /// interrupted imports).
    pub async fn purge_orphan_nodes<C: ConnectionTrait>(
        db: &C,
        kind: NodeKind,
    ) -> Result<u64, DbErr> {
        let res = Node::delete_many()
            .filter(node::Column::Kind.eq(kind.as_str()))
            .filter(node::Column::Id.not_in_subquery(all_network_nodes()))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn purge_orphan_links<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
        let res = Link::delete_many()
            .filter(link::Column::Id.not_in_subquery(all_network_links()))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn purge_orphan_functions<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
        let res = Function::delete_many()
            .filter(function::Column::Id.not_in_subquery(all_set_functions()))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    // ----- wholesale deletion -----

    /// Deletes every node of `kind` in the network. Links starting or ending
    /// at those nodes go first, then OD cells between them. Matrix totals are
    /// left to the caller.
    pub async fn delete_nodes<C: ConnectionTrait>(
        db: &C,
        network_id: i32,
        kind: NodeKind,
    ) -> Result<u64, DbErr> {
        let node_ids: SelectStatement = Query::select()
            .column(node::Column::Id)
            .from(Node)
            .and_where(node::Column::Kind.eq(kind.as_str()))
            .and_where(node::Column::Id.in_subquery(network_nodes(network_id)))
            .to_owned();

        let link_ids = Link::find()
            .select_only()
            .column(link::Column::Id)
            .filter(
                link::Column::Origin
                    .in_subquery(node_ids.clone())
                    .or(link::Column::Destination.in_subquery(node_ids.clone())),
            )
            .into_tuple::<i32>()
            .all(db)
            .await?;
        Self::delete_links(db, &link_ids, usize::MAX).await?;

        OdPair::delete_many()
            .filter(
                od_pair::Column::P
                    .in_subquery(node_ids.clone())
                    .or(od_pair::Column::Q.in_subquery(node_ids)),
            )
            .exec(db)
            .await?;

        let ids = Node::find()
            .select_only()
            .column(node::Column::Id)
            .filter(node::Column::Kind.eq(kind.as_str()))
            .filter(node::Column::Id.in_subquery(network_nodes(network_id)))
            .into_tuple::<i32>()
            .all(db)
            .await?;
        let mut deleted = 0;
        for chunk in ids.chunks(rows_per_statement(usize::MAX, 1)) {
            NetworkNode::delete_many()
                .filter(network_node::Column::NodeId.is_in(chunk.to_vec()))
                .exec(db)
                .await?;
            deleted += Node::delete_many()
                .filter(node::Column::Id.is_in(chunk.to_vec()))
                .exec(db)
                .await?
                .rows_affected;
        }
        Ok(deleted)
    }

    pub async fn delete_all_links<C: ConnectionTrait>(
        db: &C,
        network_id: i32,
    ) -> Result<u64, DbErr> {
        let ids = Link::find()
            .select_only()
            .column(link::Column::Id)
            .filter(link::Column::Id.in_subquery(network_links(network_id)))
            .into_tuple::<i32>()
            .all(db)
            .await?;
        Self::delete_links(db, &ids, usize::MAX).await
    }

    /// Deletes every function of the set, and the links using them.
    pub async fn delete_functions<C: ConnectionTrait>(
        db: &C,
        function_set_id: i32,
    ) -> Result<u64, DbErr> {
        let link_ids = Link::find()
            .select_only()
            .column(link::Column::Id)
            .filter(link::Column::VdfId.in_subquery(set_functions(function_set_id)))
            .into_tuple::<i32>()
            .all(db)
            .await?;
        Self::delete_links(db, &link_ids, usize::MAX).await?;

        let ids = Function::find()
            .select_only()
            .column(function::Column::Id)
            .filter(function::Column::Id.in_subquery(set_functions(function_set_id)))
            .into_tuple::<i32>()
            .all(db)
            .await?;
        let mut deleted = 0;
        for chunk in ids.chunks(rows_per_statement(usize::MAX, 1)) {
            FunctionSetFunction::delete_many()
                .filter(function_set_function::Column::FunctionId.is_in(chunk.to_vec()))
                .exec(db)
                .await?;
            deleted += Function::delete_many()
                .filter(function::Column::Id.is_in(chunk.to_vec()))
                .exec(db)
                .await?
                .rows_affected;
        }
        Ok(deleted)
    }
}

fn all_network_nodes() -> SelectStatement {
    Query::select()
        .column(network_node::Column::NodeId)
        .from(NetworkNode)
        .to_owned()
}

fn all_network_links() -> SelectStatement {
    Query::select()
        .column(network_link::Column::LinkId)
        .from(NetworkLink)
        .to_owned()
}

fn all_set_functions() -> SelectStatement {
    Query::select()
        .column(function_set_function::Column::FunctionId)
        .from(FunctionSetFunction)
        .to_owned()
}
