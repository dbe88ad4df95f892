//! Owner-authoritative hit detection
//!
//! Only the client that fired a projectile tests it against tanks. A hit is
//! not applied locally; it is reported as `applydamage` and takes effect
//! when the relayed message comes back, on every client at once.

use crate::projectile::Projectile;
use crate::scene::{SceneError, SceneGraph};
use crate::tank::Tank;
use log::debug;
use shared::{Damage, HIT_RADIUS};
use std::collections::BTreeMap;

/// First living tank other than the owner within [`HIT_RADIUS`] (inclusive), by id order.
pub fn find_target(projectile: &Projectile, tanks: &BTreeMap<u32, Tank>) -> Option<u32> {
    tanks
        .values()
        .filter(|tank| tank.id != projectile.owner && tank.health() > 0)
        .find(|tank| tank.position.distance(&projectile.position) <= HIT_RADIUS)
        .map(|tank| tank.id)
}

/// Tests every projectile owned by `local_id` and removes the ones that hit.
///
/// Projectiles owned by other sessions are never tested here.
pub fn resolve_hits(
    local_id: u32,
    projectiles: &mut Vec<Projectile>,
    tanks: &BTreeMap<u32, Tank>,
    scene: &mut dyn SceneGraph,
) -> Result<Vec<Damage>, SceneError> {
    let mut hits = Vec::new();
    let mut remaining = Vec::with_capacity(projectiles.len());

    for projectile in projectiles.drain(..) {
        if projectile.owner != local_id {
            remaining.push(projectile);
            continue;
        }

        match find_target(&projectile, tanks) {
            Some(target) => {
                debug!("Projectile from {} hit tank {}", projectile.owner, target);
                hits.push(Damage {
                    by: projectile.owner,
                    to: target,
                });
                projectile.despawn(scene)?;
            }
            None => remaining.push(projectile),
        }
    }

    *projectiles = remaining;
    Ok(hits)
}
