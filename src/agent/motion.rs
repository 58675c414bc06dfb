// Movement, biting and the occlusion bookkeeping that follows a move.

use super::AgentId;
use crate::config::SimulationConfig;
use crate::constants::{MAX_MOVE_RESULTS, MAX_SEGMENTS};
use crate::instruction::Opcode;
use crate::utils::{step_on_sphere, tangent_at};
use crate::world::World;
use glam::Vec3;

impl World {
    /// One snake-like step along the heading, optionally biting the first
    /// edible photosynthesize segment in reach.
    pub(crate) fn move_agent(&mut self, id: AgentId, eat: bool, config: &SimulationConfig) {
        let i = id.index();
        let (head, heading, anchored) = {
            let agent = &self.agents[i];
            let Some(head) = agent.head() else {
                return;
            };
            (head.location, agent.move_vector, agent.flags.anchored)
        };

        let target = if anchored {
            head
        } else {
            let projected = step_on_sphere(head, heading);
            let direction = tangent_at(head, projected - head);
            let move_vector = direction * config.move_distance;
            self.agents[i].move_vector = move_vector;
            step_on_sphere(head, move_vector)
        };

        let radius = if eat {
            config.eat_radius()
        } else {
            config.move_distance
        };
        let mut hits = std::mem::take(&mut self.scratch);
        hits.clear();
        self.index
            .query_near(target, radius, MAX_MOVE_RESULTS, None, &mut hits);

        let mut blocked = false;
        let mut ate = false;
        for hit in &hits {
            let owner = hit.segment.agent();
            let seg_index = hit.segment.index();
            if owner == id {
                if anchored {
                    continue;
                }
                let segment = &self.agents[i].segments[seg_index];
                if config.allow_self_overlap || seg_index == 0 || segment.occluded {
                    continue;
                }
                if hit.location.distance(target) < radius {
                    let agent = &mut self.agents[i];
                    agent.flags.touched_self = true;
                    blocked = true;
                    break;
                }
                continue;
            }

            let target_segment = self.agents[owner.index()].segments[seg_index];
            if target_segment.opcode == Opcode::Barrier {
                blocked = true;
                break;
            }
            if eat
                && !ate
                && target_segment.opcode == Opcode::Photosynthesize
                && !target_segment.occluded
                && self.agents[i].can_eat(&self.agents[owner.index()], config)
            {
                self.bite(id, owner, config);
                ate = true;
                continue;
            }
            if !eat {
                blocked = true;
                break;
            }
        }
        self.scratch = hits;

        let agent = &mut self.agents[i];
        agent.energy -= if eat {
            config.eat_energy_cost
        } else {
            config.move_energy_cost
        };
        if blocked {
            agent.flags.was_blocked = true;
            return;
        }
        if anchored {
            return;
        }
        self.shift_body(id, target, config);
    }

    /// Bite damage is bounded by the prey's remaining energy; the gain is
    /// the digested share of the prey's photosynthetic mass, capped at the
    /// damage dealt.
    fn bite(&mut self, predator: AgentId, prey: AgentId, config: &SimulationConfig) {
        let victim = &mut self.agents[prey.index()];
        let damage = config.bite_strength.min(victim.energy.max(0.0));
        victim.energy -= damage;
        victim.flags.was_preyed_on = true;
        if victim.energy <= 0.0 {
            victim.flags.was_eaten = true;
        }
        let gain = (victim.photosynthesize_segments() as f32
            * config.bite_strength
            * config.digestion_efficiency)
            .min(damage);
        self.agents[predator.index()].energy += gain;
        self.summary.bites += 1;
        log::trace!("{predator:?} bit {prey:?} for {damage:.3} (gained {gain:.3})");
    }

    fn shift_body(&mut self, id: AgentId, target: Vec3, config: &SimulationConfig) {
        let i = id.index();
        let agent = &mut self.agents[i];
        let n = agent.num_segments;
        let old_tail = agent.segments[n - 1].location;

        let mut previous = [Vec3::ZERO; MAX_SEGMENTS];
        for (k, segment) in agent.segments[..n].iter().enumerate() {
            previous[k] = segment.location;
        }
        for k in 0..n {
            let location = if k == 0 { target } else { previous[k - 1] };
            let segment = &mut agent.segments[k];
            if segment.location == location {
                continue;
            }
            segment.location = location;
            segment.occluded = false;
            self.index.move_entity(agent.segment_id(k), location);
        }

        let new_tail = agent.segments[n - 1].location;
        let backwards = if n > 1 {
            tangent_at(old_tail, old_tail - new_tail)
        } else {
            -tangent_at(old_tail, agent.move_vector)
        };
        agent.spawn_location = Some(step_on_sphere(
            old_tail,
            backwards * config.move_distance * config.tail_spawn_offset,
        ));

        if config.allow_self_overlap {
            self.refresh_overlap(id, config);
        }
    }

    /// Marks photosynthesize segments that now lie on top of another body
    /// part as occluded, so overlapping cannot shield them.
    fn refresh_overlap(&mut self, id: AgentId, config: &SimulationConfig) {
        let i = id.index();
        let mut hits = std::mem::take(&mut self.scratch);
        for k in 0..self.agents[i].num_segments {
            let segment = self.agents[i].segments[k];
            if segment.opcode != Opcode::Photosynthesize || segment.occluded {
                continue;
            }
            let own_id = self.agents[i].segment_id(k);
            hits.clear();
            self.index
                .query_near(segment.location, config.overlap_radius(), 2, None, &mut hits);
            if hits.iter().any(|hit| hit.segment != own_id) {
                self.agents[i].segments[k].occluded = true;
            }
        }
        self.scratch = hits;
    }
}
