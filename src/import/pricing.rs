use crate::config::Thresholds;
use crate::import::error::ImportError;
use crate::import::rows::PricingRow;
use crate::import::ImportSummary;
use crate::storage::entity::simulation;
use crate::storage::repository::{
    DemandRepository, NetworkRepository, NewPolicy, PricingRepository, SimulationRepository,
};
use log::{debug, info};
use sea_orm::ConnectionTrait;
use std::collections::HashSet;

/// Replaces the simulation's tolls with `rows`. Rows naming an unknown link or
/// a user type outside the simulation's demand are dropped.
pub async fn import_pricing<C, I>(
    db: &C,
    thresholds: &Thresholds,
    sim: &simulation::Model,
    rows: I,
) -> Result<ImportSummary, ImportError>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = Result<PricingRow, ImportError>>,
{
    let links = NetworkRepository::link_id_map(db, sim.network_id).await?;
    let user_types: HashSet<i64> = DemandRepository::segments(db, sim.demand_id)
        .await?
        .into_iter()
        .map(|s| s.user_type.id as i64)
        .collect();

    let mut summary = ImportSummary::default();
    let mut policies = Vec::new();
    for row in rows {
        let row = row?;
        let Some(link_id) = links.get(&row.link).copied() else {
            debug!("toll rejected: unknown link {}", row.link);
            summary.rejected += 1;
            continue;
        };
        if let Some(ut) = row.user_type {
            if !user_types.contains(&ut) {
                debug!("toll rejected: unknown user type {}", ut);
                summary.rejected += 1;
                continue;
            }
        }
        policies.push(NewPolicy {
            link_id,
            user_type_id: row.user_type.map(|ut| ut as i32),
            value: row.value,
            start_time: row.start,
            end_time: row.end,
        });
    }

    summary.created =
        PricingRepository::replace(db, sim.id, policies, thresholds.object_chunk_size).await?;
    SimulationRepository::set_has_changed(db, sim.id, true).await?;
    info!("pricing import for simulation {}: {}", sim.id, summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::reconcile::{reconcile_functions, reconcile_links, reconcile_nodes};
    use crate::import::rows::read_rows;
    use crate::import::testing::{test_db, test_simulation};
    use crate::storage::entity::NodeKind;

    #[tokio::test]
    async fn pricing_replaces_previous_tolls() {
        let (_dir, db) = test_db().await;
        let sim = test_simulation(&db).await;
        let t = Thresholds::default();
        let segment = DemandRepository::add_segment(&db, sim.demand_id, "car", 1.0)
            .await
            .unwrap();
        reconcile_nodes(
            &db,
            &t,
            &sim,
            NodeKind::Crossing,
            read_rows(b"id\tname\tx\ty\n1\tA\t0\t0\n2\tB\t1\t1\n").unwrap(),
        )
        .await
        .unwrap();
        reconcile_functions(&db, &t, &sim, read_rows(b"id\tname\texpression\n1\tf\t1\n").unwrap())
            .await
            .unwrap();
        reconcile_links(
            &db,
            &t,
            &sim,
            read_rows(
                b"id\tname\torigin\tdestination\tfunction\tlanes\tlength\tspeed\tcapacity\n\
5\tL\t1\t2\t1\t1\t1\t1\t1\n",
            )
            .unwrap(),
        )
        .await
        .unwrap();

        let first = format!(
            "link\tusertype\tvalue\tstart\tend\n5\t\t2\t\t\n5\t{}\t3\t360\t420\n6\t\t1\t\t\n5\t999\t1\t\t\n",
            segment.user_type_id
        );
        let s = import_pricing(&db, &t, &sim, read_rows(first.as_bytes()).unwrap())
            .await
            .unwrap();
        assert_eq!(s.created, 2);
        assert_eq!(s.rejected, 2);
        let tolls = PricingRepository::list(&db, sim.id).await.unwrap();
        assert_eq!(tolls.len(), 2);
        assert_eq!(tolls[1].user_type_id, Some(segment.user_type_id));
        assert_eq!(tolls[1].start_time, Some(360.0));

        let s = import_pricing(&db, &t, &sim, read_rows(b"link\tvalue\n5\t4\n").unwrap())
            .await
            .unwrap();
        assert_eq!(s.created, 1);
        let tolls = PricingRepository::list(&db, sim.id).await.unwrap();
        assert_eq!(tolls.len(), 1);
        assert_eq!(tolls[0].value, 4.0);
        assert_eq!(tolls[0].user_type_id, None);
    }
}
