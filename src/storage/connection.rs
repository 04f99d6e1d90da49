use crate::storage::entity::{
    batch, batch_run, demand, demand_segment, function, function_set, function_set_function, link,
    matrices, network, network_link, network_node, node, od_pair, policy, simulation,
    simulation_run, user_type,
};
use log::info;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
    Statement,
};
use std::time::Duration;

pub async fn establish_connection(
    db_url: &str,
    max_connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.max_connections(max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    // WAL lets the engine read snapshots while imports write.
    let _ = db
        .execute(Statement::from_string(
            db.get_database_backend(),
            "PRAGMA journal_mode=WAL;".to_string(),
        ))
        .await?;

    create_tables(&db).await?;

    info!("Database connection established with WAL mode and tables initialized.");

    Ok(db)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let stmt = builder.build(schema.create_table_from_entity(entity).if_not_exists());
    db.execute(stmt).await?;
    Ok(())
}

async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Containers first, rows referencing them afterwards.
    create_table(db, network::Entity).await?;
    create_table(db, function_set::Entity).await?;
    create_table(db, demand::Entity).await?;
    create_table(db, matrices::Entity).await?;
    create_table(db, simulation::Entity).await?;
    create_table(db, node::Entity).await?;
    create_table(db, function::Entity).await?;
    create_table(db, link::Entity).await?;
    create_table(db, network_node::Entity).await?;
    create_table(db, network_link::Entity).await?;
    create_table(db, function_set_function::Entity).await?;
    create_table(db, user_type::Entity).await?;
    create_table(db, demand_segment::Entity).await?;
    create_table(db, od_pair::Entity).await?;
    create_table(db, policy::Entity).await?;
    create_table(db, simulation_run::Entity).await?;
    create_table(db, batch::Entity).await?;
    create_table(db, batch_run::Entity).await?;

    let backend = db.get_database_backend();
    for sql in [
        // At most one cell per (matrix, origin, destination).
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_od_pairs_unique ON od_pairs(matrices_id, p, q);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_network_nodes_unique ON network_nodes(network_id, node_id);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_network_links_unique ON network_links(network_id, link_id);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_function_set_functions_unique ON function_set_functions(function_set_id, function_id);",
        "CREATE INDEX IF NOT EXISTS idx_nodes_user_id ON nodes(user_id);",
        "CREATE INDEX IF NOT EXISTS idx_links_user_id ON links(user_id);",
        "CREATE INDEX IF NOT EXISTS idx_batch_runs_batch ON batch_runs(batch_id, position);",
    ] {
        db.execute(Statement::from_string(backend, sql.to_string()))
            .await?;
    }

    Ok(())
}
