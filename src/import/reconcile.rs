use crate::config::Thresholds;
use crate::import::error::ImportError;
use crate::import::rows::{FloatKey, FunctionRow, LinkRow, NodeRow};
use crate::import::ImportSummary;
use crate::storage::entity::{function, link, node, simulation, NodeKind};
use crate::storage::repository::{
    DemandRepository, MatrixRepository, NetworkRepository, NewLink, NewNode, SimulationRepository,
};
use log::{debug, info};
use sea_orm::{ConnectionTrait, TransactionTrait};
use std::collections::{HashMap, HashSet};

/// Network object kinds an upload can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Centroid,
    Crossing,
    Function,
    Link,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Centroid => "centroid",
            ObjectKind::Crossing => "crossing",
            ObjectKind::Function => "function",
            ObjectKind::Link => "link",
        }
    }

    pub fn node_kind(&self) -> Option<NodeKind> {
        match self {
            ObjectKind::Centroid => Some(NodeKind::Centroid),
            ObjectKind::Crossing => Some(NodeKind::Crossing),
            _ => None,
        }
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "centroid" => Ok(ObjectKind::Centroid),
            "crossing" => Ok(ObjectKind::Crossing),
            "function" => Ok(ObjectKind::Function),
            "link" => Ok(ObjectKind::Link),
            other => Err(format!("unknown object kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey {
    user_id: i64,
    name: String,
    x: FloatKey,
    y: FloatKey,
}

impl From<&node::Model> for NodeKey {
    fn from(m: &node::Model) -> Self {
        NodeKey {
            user_id: m.user_id,
            name: m.name.clone(),
            x: m.x.into(),
            y: m.y.into(),
        }
    }
}

impl From<&NodeRow> for NodeKey {
    fn from(r: &NodeRow) -> Self {
        NodeKey {
            user_id: r.id,
            name: r.name.clone(),
            x: r.x.into(),
            y: r.y.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FunctionKey {
    user_id: i64,
    name: String,
    expression: String,
}

impl From<&function::Model> for FunctionKey {
    fn from(m: &function::Model) -> Self {
        FunctionKey {
            user_id: m.user_id,
            name: m.name.clone(),
            expression: m.expression.clone(),
        }
    }
}

/// Link fields with references resolved to internal ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LinkKey {
    user_id: i64,
    name: String,
    origin: i32,
    destination: i32,
    vdf_id: i32,
    lanes: FloatKey,
    length: FloatKey,
    speed: FloatKey,
    capacity: FloatKey,
}

impl From<&link::Model> for LinkKey {
    fn from(m: &link::Model) -> Self {
        LinkKey {
            user_id: m.user_id,
            name: m.name.clone(),
            origin: m.origin,
            destination: m.destination,
            vdf_id: m.vdf_id,
            lanes: m.lanes.into(),
            length: m.length.into(),
            speed: m.speed.into(),
            capacity: m.capacity.into(),
        }
    }
}

impl From<&NewLink> for LinkKey {
    fn from(l: &NewLink) -> Self {
        LinkKey {
            user_id: l.user_id,
            name: l.name.clone(),
            origin: l.origin,
            destination: l.destination,
            vdf_id: l.vdf_id,
            lanes: l.lanes.into(),
            length: l.length.into(),
            speed: l.speed.into(),
            capacity: l.capacity.into(),
        }
    }
}

/// Makes the simulation's centroids or crossings match `rows`. Writes are
/// applied in one transaction, so rows inserted here are never seen
/// unattached by a concurrent import.
pub async fn reconcile_nodes<C, I>(
    db: &C,
    thresholds: &Thresholds,
    sim: &simulation::Model,
    kind: NodeKind,
    rows: I,
) -> Result<ImportSummary, ImportError>
where
    C: ConnectionTrait + TransactionTrait,
    I: IntoIterator<Item = Result<NodeRow, ImportError>>,
{
    let existing: HashMap<i64, node::Model> = NetworkRepository::nodes(db, sim.network_id, kind)
        .await?
        .into_iter()
        .map(|m| (m.user_id, m))
        .collect();
    // Centroids and crossings share one id namespace.
    let mut claimed = NetworkRepository::node_user_ids(db, sim.network_id, kind.other()).await?;

    let mut summary = ImportSummary::default();
    let mut to_update: Vec<(i32, NodeRow)> = Vec::new();
    let mut to_create: Vec<NewNode> = Vec::new();
    for row in rows {
        let row = row?;
        if !claimed.insert(row.id) {
            summary.rejected += 1;
            continue;
        }
        match existing.get(&row.id) {
            Some(current) if NodeKey::from(current) == NodeKey::from(&row) => summary.skipped += 1,
            Some(current) => to_update.push((current.id, row)),
            None => to_create.push(NewNode {
                user_id: row.id,
                name: row.name,
                x: row.x,
                y: row.y,
            }),
        }
    }

    let txn = db.begin().await?;
    for (id, row) in &to_update {
        NetworkRepository::update_node(&txn, *id, &row.name, row.x, row.y).await?;
    }
    summary.updated = to_update.len();

    let chunk = thresholds.object_chunk_size;
    let purged = NetworkRepository::purge_orphan_nodes(&txn, kind).await?;
    if purged > 0 {
        debug!("purged {} orphan {} rows", purged, kind);
    }
    let user_ids: Vec<i64> = to_create.iter().map(|n| n.user_id).collect();
    NetworkRepository::insert_nodes(&txn, kind, to_create, chunk).await?;
    summary.created =
        NetworkRepository::attach_nodes(&txn, sim.network_id, kind, &user_ids, chunk).await?;

    SimulationRepository::set_has_changed(&txn, sim.id, true).await?;
    txn.commit().await?;
    info!("{} import for simulation {}: {}", kind, sim.id, summary);
    Ok(summary)
}

pub async fn reconcile_functions<C, I>(
    db: &C,
    thresholds: &Thresholds,
    sim: &simulation::Model,
    rows: I,
) -> Result<ImportSummary, ImportError>
where
    C: ConnectionTrait + TransactionTrait,
    I: IntoIterator<Item = Result<FunctionRow, ImportError>>,
{
    let existing: HashMap<i64, function::Model> =
        NetworkRepository::functions(db, sim.function_set_id)
            .await?
            .into_iter()
            .map(|m| (m.user_id, m))
            .collect();

    let mut summary = ImportSummary::default();
    let mut seen = HashSet::new();
    let mut to_update: Vec<(i32, FunctionRow)> = Vec::new();
    let mut to_create: Vec<(i64, String, String)> = Vec::new();
    for row in rows {
        let row = row?;
        if !seen.insert(row.id) {
            summary.rejected += 1;
            continue;
        }
        let key = FunctionKey {
            user_id: row.id,
            name: row.name.clone(),
            expression: row.expression.clone(),
        };
        match existing.get(&row.id) {
            Some(current) if FunctionKey::from(current) == key => summary.skipped += 1,
            Some(current) => to_update.push((current.id, row)),
            None => to_create.push((row.id, row.name, row.expression)),
        }
    }

    let txn = db.begin().await?;
    for (id, row) in &to_update {
        NetworkRepository::update_function(&txn, *id, &row.name, &row.expression).await?;
    }
    summary.updated = to_update.len();

    let chunk = thresholds.object_chunk_size;
    NetworkRepository::purge_orphan_functions(&txn).await?;
    let user_ids: Vec<i64> = to_create.iter().map(|f| f.0).collect();
    NetworkRepository::insert_functions(&txn, to_create, chunk).await?;
    summary.created =
        NetworkRepository::attach_functions(&txn, sim.function_set_id, &user_ids, chunk).await?;

    SimulationRepository::set_has_changed(&txn, sim.id, true).await?;
    txn.commit().await?;
    info!("function import for simulation {}: {}", sim.id, summary);
    Ok(summary)
}

/// Links whose origin, destination or function cannot be resolved are
/// dropped when new, and abort the import when they would update an
/// existing link. An updated link is recreated under a new internal id and
/// loses its tolls.
pub async fn reconcile_links<C, I>(
    db: &C,
    thresholds: &Thresholds,
    sim: &simulation::Model,
    rows: I,
) -> Result<ImportSummary, ImportError>
where
    C: ConnectionTrait + TransactionTrait,
    I: IntoIterator<Item = Result<LinkRow, ImportError>>,
{
    let existing: HashMap<i64, link::Model> = NetworkRepository::links(db, sim.network_id)
        .await?
        .into_iter()
        .map(|m| (m.user_id, m))
        .collect();
    let nodes = NetworkRepository::node_id_map(db, sim.network_id, None).await?;
    let functions = NetworkRepository::function_id_map(db, sim.function_set_id).await?;

    let resolve = |row: &LinkRow| -> Result<NewLink, ImportError> {
        let lookup = |map: &HashMap<i64, i32>, kind: &'static str, id: i64| {
            map.get(&id)
                .copied()
                .ok_or(ImportError::UnknownReference { kind, id })
        };
        Ok(NewLink {
            user_id: row.id,
            name: row.name.clone(),
            origin: lookup(&nodes, "node", row.origin)?,
            destination: lookup(&nodes, "node", row.destination)?,
            vdf_id: lookup(&functions, "function", row.function)?,
            lanes: row.lanes,
            length: row.length,
            speed: row.speed,
            capacity: row.capacity,
        })
    };

    let mut summary = ImportSummary::default();
    let mut seen = HashSet::new();
    let mut replaced: Vec<i32> = Vec::new();
    let mut to_create: Vec<NewLink> = Vec::new();
    for row in rows {
        let row = row?;
        if !seen.insert(row.id) {
            summary.rejected += 1;
            continue;
        }
        match existing.get(&row.id) {
            Some(current) => {
                let new = resolve(&row)?;
                if LinkKey::from(current) == LinkKey::from(&new) {
                    summary.skipped += 1;
                } else {
                    replaced.push(current.id);
                    to_create.push(new);
                }
            }
            None => match resolve(&row) {
                Ok(new) => to_create.push(new),
                Err(ImportError::UnknownReference { kind, id }) => {
                    debug!("link {} rejected: unknown {} {}", row.id, kind, id);
                    summary.rejected += 1;
                }
                Err(e) => return Err(e),
            },
        }
    }

    let chunk = thresholds.object_chunk_size;
    let txn = db.begin().await?;
    NetworkRepository::delete_links(&txn, &replaced, chunk).await?;
    summary.updated = replaced.len();

    NetworkRepository::purge_orphan_links(&txn).await?;
    let user_ids: Vec<i64> = to_create.iter().map(|l| l.user_id).collect();
    NetworkRepository::insert_links(&txn, to_create, chunk).await?;
    let written = NetworkRepository::attach_links(&txn, sim.network_id, &user_ids, chunk).await?;
    summary.created = written - summary.updated;

    SimulationRepository::set_has_changed(&txn, sim.id, true).await?;
    txn.commit().await?;
    info!("link import for simulation {}: {}", sim.id, summary);
    Ok(summary)
}

/// Removes every object of `kind` from the simulation. Links referencing a
/// removed node or function go with it, tolls with their link, and OD cells
/// with their centroid.
pub async fn delete_objects<C: ConnectionTrait>(
    db: &C,
    sim: &simulation::Model,
    kind: ObjectKind,
) -> Result<u64, ImportError> {
    let deleted = match kind {
        ObjectKind::Centroid => {
            let deleted =
                NetworkRepository::delete_nodes(db, sim.network_id, NodeKind::Centroid).await?;
            refresh_matrix_totals(db, sim).await?;
            deleted
        }
        ObjectKind::Crossing => {
            NetworkRepository::delete_nodes(db, sim.network_id, NodeKind::Crossing).await?
        }
        ObjectKind::Function => NetworkRepository::delete_functions(db, sim.function_set_id).await?,
        ObjectKind::Link => NetworkRepository::delete_all_links(db, sim.network_id).await?,
    };
    SimulationRepository::set_has_changed(db, sim.id, true).await?;
    info!("deleted {} {} rows of simulation {}", deleted, kind.as_str(), sim.id);
    Ok(deleted)
}

async fn refresh_matrix_totals<C: ConnectionTrait>(
    db: &C,
    sim: &simulation::Model,
) -> Result<(), ImportError> {
    for s in DemandRepository::segments(db, sim.demand_id).await? {
        MatrixRepository::refresh_total(db, s.segment.matrices_id, s.segment.scale).await?;
    }
    if let Some(pttimes_id) = sim.pttimes_id {
        MatrixRepository::refresh_total(db, pttimes_id, 1.0).await?;
    }
    Ok(())
}
