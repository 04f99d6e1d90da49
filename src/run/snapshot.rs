use crate::run::model::RunError;
use crate::storage::entity::{simulation, NodeKind};
use crate::storage::repository::NetworkRepository;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub struct NetworkSnapshot {
    pub large: bool,
    pub centroids: Vec<Value>,
    pub crossings: Vec<Value>,
    pub links: Vec<Value>,
}

/// Builds the network snapshot. Above `network_threshold` links, records are
/// reduced to positional arrays: nodes `[id, x, y]`, links
/// `[id, origin, destination]`.
pub async fn build_snapshot<C: ConnectionTrait>(
    db: &C,
    sim: &simulation::Model,
    network_threshold: usize,
) -> Result<NetworkSnapshot, RunError> {
    let links = NetworkRepository::links(db, sim.network_id).await?;
    let large = links.len() > network_threshold;

    let mut snapshot = NetworkSnapshot {
        large,
        centroids: Vec::new(),
        crossings: Vec::new(),
        links: Vec::with_capacity(links.len()),
    };
    for kind in [NodeKind::Centroid, NodeKind::Crossing] {
        let records = NetworkRepository::nodes(db, sim.network_id, kind)
            .await?
            .into_iter()
            .map(|n| {
                if large {
                    json!([n.id, n.x, n.y])
                } else {
                    json!({"id": n.id, "user_id": n.user_id, "name": n.name, "x": n.x, "y": n.y})
                }
            });
        match kind {
            NodeKind::Centroid => snapshot.centroids.extend(records),
            NodeKind::Crossing => snapshot.crossings.extend(records),
        }
    }
    for l in links {
        snapshot.links.push(if large {
            json!([l.id, l.origin, l.destination])
        } else {
            json!({
                "id": l.id,
                "user_id": l.user_id,
                "name": l.name,
                "origin": l.origin,
                "destination": l.destination,
                "vdf": l.vdf_id,
                "lanes": l.lanes,
                "length": l.length,
                "speed": l.speed,
                "capacity": l.capacity,
            })
        });
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::import::reconcile::{reconcile_functions, reconcile_links, reconcile_nodes};
    use crate::import::rows::read_rows;
    use crate::import::testing::{test_db, test_simulation};

    #[tokio::test]
    async fn snapshot_is_aggregated_above_the_link_threshold() {
        let (_dir, db) = test_db().await;
        let sim = test_simulation(&db).await;
        let t = Thresholds::default();
        let centroids = b"id\tname\tx\ty\n1\tA\t0\t0\n2\tB\t3\t4\n";
        reconcile_nodes(&db, &t, &sim, NodeKind::Centroid, read_rows(centroids).unwrap())
            .await
            .unwrap();
        reconcile_functions(&db, &t, &sim, read_rows(b"id\tname\texpression\n1\tf\t1\n").unwrap())
            .await
            .unwrap();
        let links = b"id\tname\torigin\tdestination\tfunction\tlanes\tlength\tspeed\tcapacity\n\
5\tL\t1\t2\t1\t1\t5\t50\t900\n";
        reconcile_links(&db, &t, &sim, read_rows(links).unwrap())
            .await
            .unwrap();
        let link = NetworkRepository::links(&db, sim.network_id).await.unwrap().remove(0);

        let large = build_snapshot(&db, &sim, 0).await.unwrap();
        assert!(large.large);
        assert_eq!(large.links, vec![json!([link.id, link.origin, link.destination])]);
        assert_eq!(large.centroids.len(), 2);
        assert!(large.centroids.iter().all(|c| c.as_array().map(Vec::len) == Some(3)));
        assert!(large.crossings.is_empty());

        let small = build_snapshot(&db, &sim, t.network_threshold).await.unwrap();
        assert!(!small.large);
        assert_eq!(small.links[0]["user_id"], json!(5));
        assert_eq!(small.links[0]["capacity"], json!(900.0));
        assert_eq!(small.centroids[1]["x"], json!(3.0));
    }
}
