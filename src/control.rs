// Lock-holding handle around a World; a tick never interleaves with control edits.

use crate::config::SimulationConfig;
use crate::error::{PersistError, WorldError};
use crate::genome::Genome;
use crate::persistence;
use crate::report::TickSummary;
use crate::world::World;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

#[derive(Clone)]
pub struct SharedWorld {
    world: Arc<Mutex<World>>,
    latest: Arc<Mutex<TickSummary>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SharedWorld {
    pub fn new(world: World) -> Self {
        Self {
            world: Arc::new(Mutex::new(world)),
            latest: Arc::new(Mutex::new(TickSummary::default())),
        }
    }

    pub fn with_world<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        f(&mut *lock(&self.world))
    }

    pub fn step(&self) -> Result<TickSummary, WorldError> {
        let summary = self.with_world(World::step)?;
        *lock(&self.latest) = summary.clone();
        Ok(summary)
    }

    /// Steps `ticks` times, releasing the lock between ticks.
    pub fn run_ticks(&self, ticks: u64) -> Result<TickSummary, WorldError> {
        let mut last = TickSummary::default();
        for _ in 0..ticks {
            last = self.step()?;
        }
        Ok(last)
    }

    pub fn latest_summary(&self) -> TickSummary {
        lock(&self.latest).clone()
    }

    pub fn reset(&self) {
        self.with_world(World::reset);
        *lock(&self.latest) = TickSummary::default();
    }

    pub fn bulk_insert(&self, genome: Genome, count: usize) -> Result<usize, WorldError> {
        self.with_world(|world| world.seed_random(genome, count))
    }

    pub fn update_config(&self, edit: impl FnOnce(&mut SimulationConfig)) {
        self.with_world(|world| edit(world.config_mut()));
    }

    pub fn save(&self) -> Vec<u8> {
        self.with_world(|world| persistence::save(world))
    }

    /// Replaces the world with a decoded snapshot. On error the current
    /// world is left untouched.
    pub fn load(&self, bytes: &[u8]) -> Result<(), PersistError> {
        let loaded = persistence::load(bytes)?;
        self.with_world(|world| *world = loaded);
        Ok(())
    }

    /// Steps on a background thread until `stop` is raised or `ticks` ticks
    /// have run (`None` runs until stopped). The thread yields the number of
    /// ticks completed; a failing tick is logged and ends the run.
    pub fn spawn_worker(
        &self,
        ticks: Option<u64>,
        stop: Arc<AtomicBool>,
    ) -> JoinHandle<Result<u64, WorldError>> {
        let shared = self.clone();
        thread::spawn(move || {
            let mut done = 0;
            while !stop.load(Ordering::Relaxed) && ticks.is_none_or(|limit| done < limit) {
                if let Err(err) = shared.step() {
                    log::error!("simulation stopped after {done} ticks: {err}");
                    return Err(err);
                }
                done += 1;
            }
            log::info!("worker finished after {done} ticks");
            Ok(done)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn shared() -> SharedWorld {
        SharedWorld::new(World::with_capacity(32, SimulationConfig::uniform(), 8))
    }

    #[test]
    fn worker_runs_the_requested_ticks() {
        let shared = shared();
        shared.bulk_insert(Genome::plant(), 10).unwrap();
        let handle = shared.spawn_worker(Some(25), Arc::new(AtomicBool::new(false)));
        assert_eq!(handle.join().unwrap(), Ok(25));
        assert_eq!(shared.with_world(|w| w.tick()), 25);
        assert_eq!(shared.latest_summary().tick, 24);
    }

    #[test]
    fn raised_stop_flag_halts_the_worker() {
        let shared = shared();
        let stop = Arc::new(AtomicBool::new(true));
        let handle = shared.spawn_worker(None, stop);
        assert_eq!(handle.join().unwrap(), Ok(0));
    }

    #[test]
    fn snapshot_restores_an_earlier_state() {
        let shared = shared();
        shared.bulk_insert(Genome::plant(), 6).unwrap();
        shared.run_ticks(5).unwrap();
        let bytes = shared.save();
        let population = shared.with_world(|w| w.num_agents());

        shared.reset();
        assert_eq!(shared.with_world(|w| w.num_agents()), 0);
        shared.load(&bytes).unwrap();
        assert_eq!(shared.with_world(|w| (w.tick(), w.num_agents())), (5, population));

        assert!(shared.load(&bytes[..10]).is_err());
        assert_eq!(shared.with_world(|w| w.tick()), 5);
    }

    #[test]
    fn config_edits_apply_between_ticks() {
        let shared = shared();
        shared
            .with_world(|w| w.spawn_agent(Genome::plant(), Vec3::Z, Vec3::X, Some(1.0)))
            .unwrap();
        shared.update_config(|config| config.photosynthesis_energy = 0.0);
        shared.update_config(|config| config.instruction_energy_cost = 0.0);
        shared.update_config(|config| config.photosynthesize_op_energy = 0.0);
        shared.step().unwrap();
        let energy = shared.with_world(|w| w.living().map(|a| a.energy).sum::<f32>());
        assert_eq!(energy, 1.0);
    }
}
