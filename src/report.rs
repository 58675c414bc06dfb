use crate::agent::{Agent, DeathCause};
use crate::genome::Genome;
use crate::world::World;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DeathCounts {
    pub age: usize,
    pub starvation: usize,
    pub eaten: usize,
    pub decimated: usize,
    pub evicted: usize,
}

impl DeathCounts {
    pub fn get(&self, cause: DeathCause) -> usize {
        match cause {
            DeathCause::Age => self.age,
            DeathCause::Starvation => self.starvation,
            DeathCause::Eaten => self.eaten,
            DeathCause::Decimated => self.decimated,
            DeathCause::Evicted => self.evicted,
        }
    }

    pub fn total(&self) -> usize {
        DeathCause::ALL.iter().map(|&cause| self.get(cause)).sum()
    }
}

/// What happened during one call to `World::step`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    /// Agents in the pool after the tick (barriers included).
    pub population: usize,
    pub births: usize,
    pub deaths: DeathCounts,
    pub bites: usize,
    pub crowded_spawns: usize,
    pub food_seeds: usize,
}

impl TickSummary {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    pub fn record_death(&mut self, cause: DeathCause) {
        let slot = match cause {
            DeathCause::Age => &mut self.deaths.age,
            DeathCause::Starvation => &mut self.deaths.starvation,
            DeathCause::Eaten => &mut self.deaths.eaten,
            DeathCause::Decimated => &mut self.deaths.decimated,
            DeathCause::Evicted => &mut self.deaths.evicted,
        };
        *slot += 1;
    }
}

impl fmt::Display for TickSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick {}: population {}, births {}, deaths {} (age {}, starved {}, eaten {}), bites {}, food {}",
            self.tick,
            self.population,
            self.births,
            self.deaths.total(),
            self.deaths.age,
            self.deaths.starvation,
            self.deaths.eaten,
            self.bites,
            self.food_seeds,
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SpeciesCount {
    pub genome: Genome,
    pub count: usize,
}

impl World {
    /// The `n` most common genomes among living agents, most common first.
    /// Ties are ordered by genome so the result is deterministic.
    pub fn top_species(&self, n: usize) -> Vec<SpeciesCount> {
        let census = self
            .agents()
            .par_iter()
            .filter(|agent| agent.is_alive())
            .fold(HashMap::new, |mut counts: HashMap<Genome, usize>, agent| {
                *counts.entry(agent.genome).or_default() += 1;
                counts
            })
            .reduce(HashMap::new, |mut left, right| {
                for (genome, count) in right {
                    *left.entry(genome).or_default() += count;
                }
                left
            });

        let mut species: Vec<SpeciesCount> = census
            .into_iter()
            .map(|(genome, count)| SpeciesCount { genome, count })
            .collect();
        species.sort_unstable_by(|a, b| b.count.cmp(&a.count).then(a.genome.cmp(&b.genome)));
        species.truncate(n);
        species
    }

    /// Earliest tick at which a living agent's lineage records `genome`.
    pub fn first_tick_seen(&self, genome: &Genome) -> Option<u64> {
        self.carriers(genome).map(|agent| agent.lineage.first_tick).min()
    }

    /// The genome `genome` mutated from, if any living carrier knows it.
    pub fn parent_genome(&self, genome: &Genome) -> Option<Genome> {
        self.carriers(genome).find_map(|agent| agent.lineage.parent)
    }

    fn carriers<'a>(&'a self, genome: &'a Genome) -> impl Iterator<Item = &'a Agent> + 'a {
        self.living().filter(move |agent| agent.genome == *genome)
    }
}
