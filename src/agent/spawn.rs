// Reproduction, crowding control and death (with conversion to food).

use super::{AgentId, Lineage};
use crate::constants::MAX_CROWD_RESULTS;
use crate::error::WorldError;
use crate::genome::Genome;
use crate::utils::{random_tangent, step_on_sphere};
use crate::world::{TickContext, World};
use glam::Vec3;
use rand::Rng;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DeathCause {
    Age,
    Starvation,
    Eaten,
    /// Random cull while the decimate toggle is on.
    Decimated,
    /// Killed to make room in a full pool.
    Evicted,
}

impl DeathCause {
    pub const ALL: [DeathCause; 5] = [
        DeathCause::Age,
        DeathCause::Starvation,
        DeathCause::Eaten,
        DeathCause::Decimated,
        DeathCause::Evicted,
    ];

    pub fn leaves_food(self) -> bool {
        matches!(self, DeathCause::Starvation | DeathCause::Eaten)
    }
}

impl World {
    /// Frees the agent's slot. Starved or eaten motile agents leave one
    /// dormant food seed per segment that was still exposed.
    pub(crate) fn die(
        &mut self,
        id: AgentId,
        cause: DeathCause,
        ctx: &TickContext,
    ) -> Result<(), WorldError> {
        let config = &ctx.config;
        let agent = &self.agents[id.index()];
        let mut seeds = Vec::new();
        let mut share = 0.0;
        if cause.leaves_food() && config.become_food && agent.flags.is_motile {
            seeds.extend(agent.segments().iter().filter(|s| !s.occluded).map(|s| s.location));
            share = agent.spawn_energy / agent.num_segments().max(1) as f32 / 2.0;
        }
        log::debug!(
            "tick {}: {id:?} {} died ({cause:?}, energy {:.2})",
            ctx.tick,
            agent.genome,
            agent.energy
        );

        self.kill(id)?;
        self.summary.record_death(cause);
        for location in seeds {
            if !self.spawn_food(location, share, ctx)? {
                break;
            }
        }
        Ok(())
    }

    // false: pool full
    fn spawn_food(
        &mut self,
        location: Vec3,
        energy: f32,
        ctx: &TickContext,
    ) -> Result<bool, WorldError> {
        let Some(id) = self.create_empty_slot(false)? else {
            log::debug!("pool full, dropping food seed");
            return Ok(false);
        };
        let seed = &mut self.agents[id.index()];
        if let Err(err) = seed.place(Genome::plant(), &[location], &ctx.config) {
            self.release_slot(id);
            return Err(err.into());
        }
        seed.energy = energy;
        seed.dormancy = ctx.config.food_dormancy;
        seed.flags.allow_mutate = false;
        seed.lineage = Lineage {
            first_tick: ctx.tick,
            parent: None,
        };
        self.add_to_world(id)?;
        self.summary.food_seeds += 1;
        Ok(true)
    }

    pub(crate) fn try_spawn(&mut self, id: AgentId, ctx: &TickContext) -> Result<(), WorldError> {
        let config = &ctx.config;
        let i = id.index();
        let parent = &self.agents[i];
        if !parent.is_alive() || parent.energy < parent.spawn_energy || parent.spawn_delay > 0 {
            return Ok(());
        }
        let motile = parent.flags.is_motile;
        let tail_spot = parent.spawn_location;
        let location = match tail_spot {
            Some(location) => location,
            None => self.spread_point(id, config.move_distance, ctx),
        };

        if self.is_crowded(id, location, ctx) {
            let parent = &mut self.agents[i];
            if motile {
                parent.energy -= config.crowding_penalty;
            } else {
                parent.dormancy += config.crowding_dormancy;
            }
            self.summary.crowded_spawns += 1;
            return Ok(());
        }

        let parent_genome = self.agents[i].genome;
        let mut genome = parent_genome;
        let mut lineage = self.agents[i].lineage;
        if self.agents[i].flags.allow_mutate && self.rng.gen_bool(config.mutation_probability()) {
            let mutated = parent_genome.mutate(&ctx.catalog, &mut self.rng)?;
            if mutated != parent_genome {
                log::debug!("tick {}: {parent_genome} mutated into {mutated}", ctx.tick);
                genome = mutated;
                lineage = Lineage {
                    first_tick: ctx.tick,
                    parent: Some(parent_genome),
                };
            }
        }

        let Some(child) = self.create_empty_slot(false)? else {
            log::debug!("pool full, {id:?} could not spawn");
            return Ok(());
        };
        let direction = random_tangent(location, &mut self.rng);
        let offspring = &mut self.agents[child.index()];
        if let Err(err) = offspring.initialize(genome, location, direction, config) {
            self.release_slot(child);
            return Err(err.into());
        }
        offspring.energy = offspring.spawn_energy * 0.5;
        offspring.lineage = lineage;
        let child_motile = offspring.flags.is_motile;
        if child_motile {
            offspring.sleep += config.spawn_sleep_ticks;
        }
        self.add_to_world(child)?;

        let parent = &mut self.agents[i];
        parent.energy = parent.spawn_energy * 0.5;
        parent.spawn_delay = config.spawn_delay_ticks;
        if child_motile {
            parent.sleep += config.spawn_sleep_ticks;
        }
        self.summary.births += 1;
        log::debug!("tick {}: {id:?} spawned {child:?}", ctx.tick);
        Ok(())
    }

    /// Random point between `spawn_min_spread` and `spawn_max_spread` move
    /// distances from the tail, for parents that never moved.
    fn spread_point(&mut self, id: AgentId, move_distance: f32, ctx: &TickContext) -> Vec3 {
        let agent = &self.agents[id.index()];
        let tail = agent
            .segments()
            .last()
            .map_or(agent.birth_location, |s| s.location);
        let (lo, hi) = (ctx.config.spawn_min_spread, ctx.config.spawn_max_spread);
        let spread = if hi > lo { self.rng.gen_range(lo..hi) } else { lo };
        let direction = random_tangent(tail, &mut self.rng);
        step_on_sphere(tail, direction * spread * move_distance)
    }

    /// Counts neighbors around `location`. Over the cap, motile parents only
    /// count distinct live agents of their own motility class, ignoring
    /// dormant single-segment seeds.
    fn is_crowded(&mut self, id: AgentId, location: Vec3, ctx: &TickContext) -> bool {
        let config = &ctx.config;
        let mut hits = std::mem::take(&mut self.scratch);
        hits.clear();
        let raw = self.index.query_near(
            location,
            config.crowding_radius,
            MAX_CROWD_RESULTS,
            None,
            &mut hits,
        );
        let motile = self.agents[id.index()].flags.is_motile;
        let crowded = if raw <= config.crowding_cap {
            false
        } else if !motile {
            true
        } else {
            let mut owners: Vec<AgentId> = hits
                .iter()
                .map(|hit| hit.segment.agent())
                .filter(|owner| {
                    let other = &self.agents[owner.index()];
                    other.is_alive()
                        && !(other.is_dormant() && other.num_segments() == 1)
                        && other.flags.is_motile == motile
                })
                .collect();
            owners.sort_unstable();
            owners.dedup();
            owners.len() > config.crowding_cap
        };
        self.scratch = hits;
        crowded
    }
}
