use super::AgentId;
use crate::config::SimulationConfig;
use crate::constants::MAX_LOOK_RESULTS;
use crate::instruction::Opcode;
use crate::utils::{step_on_sphere, tangent_at};
use crate::world::World;

impl World {
    /// Marches `look_steps` steps ahead of the head. The scan radius starts
    /// at `move_distance` and grows by `look_spread` every step. The first
    /// step that sees anything decides: edible food means true, anything
    /// else blocks the view.
    pub(crate) fn is_facing_food(&mut self, id: AgentId, config: &SimulationConfig) -> bool {
        let i = id.index();
        let Some(head) = self.agents[i].head().map(|s| s.location) else {
            return false;
        };
        let steps = config.look_steps.max(1);
        let stride = config.look_distance / steps as f32;
        let mut position = head;
        let mut heading = tangent_at(head, self.agents[i].move_vector);
        let mut radius = config.move_distance;

        let mut hits = std::mem::take(&mut self.scratch);
        let mut seen = None;
        for _ in 0..steps {
            position = step_on_sphere(position, heading * stride);
            heading = tangent_at(position, heading);
            hits.clear();
            self.index
                .query_near(position, radius, MAX_LOOK_RESULTS, Some(id), &mut hits);
            if !hits.is_empty() {
                let viewer = &self.agents[i];
                let food = hits.iter().any(|hit| {
                    let owner = &self.agents[hit.segment.agent().index()];
                    let segment = owner.segments[hit.segment.index()];
                    segment.opcode == Opcode::Photosynthesize
                        && !segment.occluded
                        && viewer.can_eat(owner, config)
                });
                seen = Some(food);
                break;
            }
            radius *= config.look_spread;
        }
        self.scratch = hits;
        seen.unwrap_or(false)
    }

    /// True when a live eater that could prey on this agent has a mouth
    /// segment nearby; otherwise whether any own segment is occluded.
    pub(crate) fn is_threatened(&mut self, id: AgentId, config: &SimulationConfig) -> bool {
        let i = id.index();
        let Some(head) = self.agents[i].head().map(|s| s.location) else {
            return false;
        };
        let radius = config.move_distance * config.threat_radius_factor;
        let mut hits = std::mem::take(&mut self.scratch);
        hits.clear();
        self.index
            .query_near(head, radius, MAX_LOOK_RESULTS, Some(id), &mut hits);
        let prey = &self.agents[i];
        let threatened = hits.iter().any(|hit| {
            let owner = &self.agents[hit.segment.agent().index()];
            owner.segments[hit.segment.index()].opcode == Opcode::MoveAndEat
                && owner.is_alive()
                && owner.can_eat(prey, config)
        });
        self.scratch = hits;
        threatened || prey.segments().iter().any(|s| s.occluded)
    }
}
