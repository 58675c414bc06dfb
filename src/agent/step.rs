// Per-tick state machine: gating, metabolism and the instruction loop.

use super::{AgentId, DeathCause, Status};
use crate::constants::{DECIMATE_FRACTION, MAX_HYPER_STEPS, RESET_CONDITION_ON_WRAP};
use crate::error::WorldError;
use crate::instruction::{Condition, Instruction, Opcode};
use crate::world::{TickContext, World};
use glam::Quat;
use rand::Rng;

impl World {
    pub(crate) fn step_agent(&mut self, id: AgentId, ctx: &TickContext) -> Result<(), WorldError> {
        let i = id.index();
        let config = &ctx.config;
        {
            let agent = &self.agents[i];
            if !agent.exists() {
                return Ok(());
            }
            if agent.flags.was_eaten {
                return self.die(id, DeathCause::Eaten, ctx);
            }
            if agent.num_segments() == 0 {
                return self.die(id, DeathCause::Starvation, ctx);
            }
            if agent.status != Status::Alive {
                return Ok(());
            }
            if config.slow_lane_period > 1
                && agent.birth_location.z > 0.0
                && ctx.tick % config.slow_lane_period as u64 != 0
            {
                return Ok(());
            }
        }

        {
            let agent = &mut self.agents[i];
            if agent.dormancy > 0 {
                agent.dormancy -= 1;
                return Ok(());
            }
            agent.lifespan = agent.lifespan.saturating_sub(1);
            if agent.lifespan == 0 {
                return self.die(id, DeathCause::Age, ctx);
            }
        }

        if config.decimate && self.rng.gen_bool(DECIMATE_FRACTION) {
            return self.die(id, DeathCause::Decimated, ctx);
        }

        {
            let agent = &mut self.agents[i];
            agent.energy += config.photosynthesis_energy * agent.lit_segments() as f32;
            agent.spawn_delay = agent.spawn_delay.saturating_sub(1);
            if agent.energy <= 0.0 || agent.flags.was_eaten {
                let cause = if agent.flags.was_eaten {
                    DeathCause::Eaten
                } else {
                    DeathCause::Starvation
                };
                return self.die(id, cause, ctx);
            }
        }

        self.run_program(id, ctx)?;

        let agent = &mut self.agents[i];
        if !agent.flags.is_hyper {
            agent.dormancy += config.pacing_dormancy();
        }

        self.try_spawn(id, ctx)
    }

    /// Executes one instruction, or up to `MAX_HYPER_STEPS` in hyper mode.
    /// Skipped instructions are free of the budget; at most one extra pass
    /// over the genome is skipped per tick.
    fn run_program(&mut self, id: AgentId, ctx: &TickContext) -> Result<(), WorldError> {
        let i = id.index();
        let config = &ctx.config;
        let mut budget = if self.agents[i].flags.is_hyper {
            MAX_HYPER_STEPS
        } else {
            1
        };
        let mut skips_left = self.agents[i].num_segments();
        let mut executed = 0;

        while executed < budget {
            let agent = &mut self.agents[i];
            if agent.sleep > 0 {
                agent.energy -= config.sleep_energy_cost;
                agent.sleep -= 1;
                break;
            }
            let Some(ins) = agent.active_instruction() else {
                break;
            };

            let flag = agent.flags.condition;
            let runs = !ins.opcode.supports_conditions() || ins.condition.permits(flag);
            if !runs {
                agent.energy -= config.skip_energy_cost;
                if self.advance_program_counter(id) {
                    budget = budget.min(executed.max(1));
                }
                if skips_left == 0 {
                    break;
                }
                skips_left -= 1;
                continue;
            }

            // Always + Or keeps an already-set condition set after the instruction.
            let reassert = config.allow_or && ins.condition == Condition::Always && flag;
            agent.energy -= config.instruction_energy_cost;
            if agent.flags.is_hyper {
                agent.energy -= config.hyper_energy_cost;
            }

            let advance = self.execute(id, ins, ctx, &mut budget);
            if reassert {
                self.agents[i].flags.condition = true;
            }
            executed += 1;
            if advance && self.advance_program_counter(id) {
                budget = budget.min(executed);
            }
        }
        Ok(())
    }

    /// Returns whether the program counter should advance afterwards.
    fn execute(
        &mut self,
        id: AgentId,
        ins: Instruction,
        ctx: &TickContext,
        budget: &mut usize,
    ) -> bool {
        let i = id.index();
        let config = &ctx.config;
        match ins.opcode {
            Opcode::Move => self.move_agent(id, false, config),
            Opcode::MoveAndEat => self.move_agent(id, true, config),
            Opcode::TurnLeft => self.turn(id, config.turn_angle),
            Opcode::TurnRight => self.turn(id, -config.turn_angle),
            Opcode::HardTurnLeft => self.turn(id, config.hard_turn_angle),
            Opcode::HardTurnRight => self.turn(id, -config.hard_turn_angle),
            Opcode::Sleep => {
                let agent = &mut self.agents[i];
                agent.sleep += config.sleep_ticks * (agent.active_segment as u32 + 1);
            }
            Opcode::Hyper => {
                self.agents[i].flags.is_hyper = true;
                *budget = (*budget).max(MAX_HYPER_STEPS);
            }
            Opcode::Photosynthesize => {
                let agent = &mut self.agents[i];
                if !agent.segments[agent.active_segment].occluded {
                    agent.energy += config.photosynthesize_op_energy;
                }
                // Holds the counter for the rest of this tick, then moves on.
                if !agent.flags.pc_held {
                    agent.flags.pc_held = true;
                    *budget = 0;
                    return false;
                }
            }
            Opcode::TestSeeFood => {
                let seen = self.is_facing_food(id, config);
                self.agents[i].flags.set_condition(seen);
            }
            Opcode::TestBlocked => {
                let flags = &mut self.agents[i].flags;
                let blocked = flags.take_blocked();
                flags.set_condition(blocked);
            }
            Opcode::TestPreyedOn => {
                let flags = &mut self.agents[i].flags;
                let preyed_on = flags.take_preyed_on();
                flags.set_condition(preyed_on);
            }
            Opcode::TestOccluded => {
                let threatened = self.is_threatened(id, config);
                self.agents[i].flags.set_condition(threatened);
            }
            Opcode::SetAnchored | Opcode::ClearAnchored => {
                let anchored = ins.opcode == Opcode::SetAnchored;
                let agent = &mut self.agents[i];
                agent.flags.anchored = anchored;
                let n = agent.num_segments;
                for segment in &mut agent.segments[..n] {
                    segment.anchored = anchored;
                }
            }
            Opcode::Barrier => {}
        }
        true
    }

    /// Rotates the heading about the head's radial axis.
    fn turn(&mut self, id: AgentId, angle: f32) {
        let agent = &mut self.agents[id.index()];
        let Some(axis) = agent.head().map(|h| h.location.normalize_or_zero()) else {
            return;
        };
        agent.move_vector = Quat::from_axis_angle(axis, angle) * agent.move_vector;
    }

    /// Returns true when the counter wrapped back to the first segment.
    fn advance_program_counter(&mut self, id: AgentId) -> bool {
        let agent = &mut self.agents[id.index()];
        let n = agent.num_segments.max(1);
        agent.flags.pc_held = false;
        agent.active_segment = (agent.active_segment + 1) % n;
        if agent.active_segment != 0 {
            return false;
        }
        agent.flags.is_hyper = false;
        if RESET_CONDITION_ON_WRAP {
            agent.flags.condition = false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::genome::Genome;
    use glam::Vec3;

    fn quiet_config() -> SimulationConfig {
        SimulationConfig {
            mutation_percent: 0.0,
            ..SimulationConfig::uniform()
        }
    }

    fn program(instructions: &[Instruction]) -> Genome {
        Genome::new(instructions).unwrap()
    }

    fn always(ops: &[Opcode]) -> Genome {
        let instructions: Vec<Instruction> = ops.iter().map(|&op| Instruction::always(op)).collect();
        program(&instructions)
    }

    fn place(world: &mut World, genome: Genome) -> AgentId {
        world
            .spawn_agent(genome, Vec3::Z, Vec3::X, Some(10.0))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn photosynthesize_holds_the_counter_for_one_tick() {
        let mut world = World::with_capacity(4, quiet_config(), 3);
        let id = place(&mut world, always(&[Opcode::Photosynthesize, Opcode::Move]));

        world.step().unwrap();
        let agent = world.agent(id).unwrap();
        assert_eq!(agent.active_segment(), 0);
        assert!(agent.flags.pc_held);

        world.step().unwrap();
        let agent = world.agent(id).unwrap();
        assert_eq!(agent.active_segment(), 1);
        assert!(!agent.flags.pc_held);

        world.step().unwrap();
        let agent = world.agent(id).unwrap();
        assert_ne!(agent.head().unwrap().location, Vec3::Z);
        assert_eq!(agent.active_segment(), 0);
    }

    #[test]
    fn or_mode_keeps_a_set_condition() {
        for allow_or in [false, true] {
            let config = SimulationConfig {
                allow_or,
                ..quiet_config()
            };
            let mut world = World::with_capacity(4, config, 3);
            let id = place(&mut world, always(&[Opcode::TestPreyedOn, Opcode::TestPreyedOn]));
            world.agent_mut(id).unwrap().flags.condition = true;

            world.step().unwrap();
            let flags = world.agent(id).unwrap().flags;
            assert_eq!(flags.condition, allow_or);
            assert!(flags.secondary_condition);
        }
    }

    #[test]
    fn failed_condition_skips_for_a_fee_and_runs_the_next() {
        let config = quiet_config();
        let mut world = World::with_capacity(4, config.clone(), 3);
        let id = place(
            &mut world,
            program(&[
                Instruction::new(Opcode::Move, Condition::If),
                Instruction::new(Opcode::TestBlocked, Condition::NotIf),
            ]),
        );

        world.step().unwrap();
        let agent = world.agent(id).unwrap();
        assert_eq!(agent.head().unwrap().location, Vec3::Z);
        assert_eq!(agent.active_segment(), 0, "skipped, ran the test and wrapped");
        let spent = config.skip_energy_cost + config.instruction_energy_cost;
        assert!((agent.energy - (10.0 - spent)).abs() < 1e-5);
    }

    #[test]
    fn sleep_scales_with_segment_and_idles_the_program() {
        let config = quiet_config();
        let mut world = World::with_capacity(4, config.clone(), 3);
        let id = place(&mut world, always(&[Opcode::TestBlocked, Opcode::Sleep]));

        world.step().unwrap();
        world.step().unwrap();
        let agent = world.agent(id).unwrap();
        assert_eq!(agent.sleep, config.sleep_ticks * 2);
        assert_eq!(agent.active_segment(), 0);
        let before = agent.energy;

        world.step().unwrap();
        let agent = world.agent(id).unwrap();
        assert_eq!(agent.sleep, config.sleep_ticks * 2 - 1);
        assert_eq!(agent.active_segment(), 0);
        assert!((before - agent.energy - config.sleep_energy_cost).abs() < 1e-5);
    }

    #[test]
    fn anchored_agent_moves_in_place() {
        let config = quiet_config();
        let mut world = World::with_capacity(4, config.clone(), 3);
        let id = place(
            &mut world,
            always(&[
                Opcode::SetAnchored,
                Opcode::Move,
                Opcode::ClearAnchored,
                Opcode::Move,
            ]),
        );

        world.step().unwrap();
        let agent = world.agent(id).unwrap();
        assert!(agent.flags.anchored);
        assert!(agent.segments().iter().all(|s| s.anchored));

        let before = world.agent(id).unwrap().energy;
        world.step().unwrap();
        let agent = world.agent(id).unwrap();
        assert_eq!(agent.head().unwrap().location, Vec3::Z);
        assert!(!agent.flags.was_blocked);
        let spent = config.instruction_energy_cost + config.move_energy_cost;
        assert!((before - agent.energy - spent).abs() < 1e-5);

        world.step().unwrap();
        world.step().unwrap();
        let agent = world.agent(id).unwrap();
        assert!(!agent.flags.anchored);
        assert!(agent.head().unwrap().location.x > 0.0);
    }

    #[test]
    fn northern_births_act_every_other_tick() {
        let config = SimulationConfig {
            mutation_percent: 0.0,
            ..SimulationConfig::default()
        };
        let mut world = World::with_capacity(4, config.clone(), 3);
        let north = world
            .spawn_agent(Genome::plant(), Vec3::Z, Vec3::X, None)
            .unwrap()
            .unwrap();
        let south = world
            .spawn_agent(Genome::plant(), Vec3::NEG_Z, Vec3::X, None)
            .unwrap()
            .unwrap();

        world.step().unwrap();
        world.step().unwrap();
        assert_eq!(world.agent(north).unwrap().lifespan, config.lifespan - 1);
        assert_eq!(world.agent(south).unwrap().lifespan, config.lifespan - 2);
    }

    #[test]
    fn slow_speed_pads_each_action_with_dormancy() {
        let config = SimulationConfig {
            speed: 0.5,
            ..quiet_config()
        };
        assert_eq!(config.pacing_dormancy(), 1);
        let mut world = World::with_capacity(4, config.clone(), 3);
        let id = place(&mut world, Genome::plant());

        world.step().unwrap();
        assert_eq!(world.agent(id).unwrap().dormancy, 1);
        world.step().unwrap();
        world.step().unwrap();
        let agent = world.agent(id).unwrap();
        assert_eq!(agent.lifespan, config.lifespan - 2);
        assert_eq!(agent.dormancy, 1);
    }

    #[test]
    fn decimation_culls_only_when_enabled() {
        for decimate in [false, true] {
            let config = SimulationConfig {
                decimate,
                ..quiet_config()
            };
            let mut world = World::with_capacity(64, config, 5);
            world.seed_random(Genome::plant(), 40).unwrap();
            let mut culled = 0;
            for _ in 0..5 {
                let summary = world.step().unwrap();
                assert_eq!(summary.deaths.total(), summary.deaths.decimated);
                culled += summary.deaths.decimated;
            }
            assert_eq!(culled > 0, decimate);
            assert_eq!(world.num_agents(), 40 - culled);
        }
    }

    #[test]
    fn preyed_on_flag_is_read_once() {
        let mut world = World::with_capacity(4, quiet_config(), 3);
        let id = place(&mut world, always(&[Opcode::TestPreyedOn]));
        world.agent_mut(id).unwrap().flags.was_preyed_on = true;

        world.step().unwrap();
        let flags = world.agent(id).unwrap().flags;
        assert!(flags.condition);
        assert!(!flags.was_preyed_on);

        world.step().unwrap();
        let flags = world.agent(id).unwrap().flags;
        assert!(!flags.condition);
        assert!(flags.secondary_condition);
    }

    #[test]
    fn agent_without_segments_counts_as_starved() {
        let mut world = World::with_capacity(4, quiet_config(), 3);
        let id = place(&mut world, Genome::plant());
        let segment = world.agents[id.index()].segment_id(0);
        world.index.remove(segment);
        world.agents[id.index()].num_segments = 0;

        let summary = world.step().unwrap();
        assert_eq!(summary.deaths.starvation, 1);
        assert_eq!(summary.deaths.eaten, 0);
        assert!(!world.agent(id).unwrap().exists());
    }
}
