//! Agent storage and occupancy queries.

use crate::model::{Agent, Position};
use anyhow::{Result, bail};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Stable handle into the population arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentId(usize);

/// Arena of agents with ordered live and deceased handle lists.
///
/// Agents are never removed from the arena during a run; dying only moves
/// the handle from `live` to `deceased`.
#[derive(Debug, Default)]
pub struct Population {
    arena: Vec<Agent>,
    live: Vec<AgentId>,
    deceased: Vec<AgentId>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.live.clear();
        self.deceased.clear();
    }

    pub fn spawn(&mut self, agent: Agent) -> AgentId {
        let id = AgentId(self.arena.len());
        self.arena.push(agent);
        self.live.push(id);
        id
    }

    pub fn get(&self, id: AgentId) -> &Agent {
        &self.arena[id.0]
    }

    pub fn get_mut(&mut self, id: AgentId) -> &mut Agent {
        &mut self.arena[id.0]
    }

    pub fn live_ids(&self) -> &[AgentId] {
        &self.live
    }

    pub fn live(&self) -> impl Iterator<Item = &Agent> {
        self.live.iter().map(|&id| &self.arena[id.0])
    }

    pub fn n_deceased(&self) -> usize {
        self.deceased.len()
    }

    /// Move `id` from the live population to the deceased collection.
    pub fn retire(&mut self, id: AgentId) {
        if let Some(idx) = self.live.iter().position(|&live_id| live_id == id) {
            self.live.remove(idx);
            self.deceased.push(id);
        }
    }

    /// First live agent at `pos`, in population order.
    pub fn occupant_at(&self, pos: Position) -> Option<AgentId> {
        self.live
            .iter()
            .copied()
            .find(|&id| self.arena[id.0].pos() == pos)
    }

    pub fn is_free(&self, pos: Position, grid_size: i32) -> bool {
        pos.within(grid_size) && self.occupant_at(pos).is_none()
    }

    /// Propose up to `max_attempts` steps for `id` and return the first free one.
    pub fn find_free_step<R: Rng + ?Sized>(
        &self,
        id: AgentId,
        grid_size: i32,
        max_attempts: usize,
        rng: &mut R,
    ) -> Option<Position> {
        let agent = self.get(id);
        (0..max_attempts)
            .map(|_| agent.step(rng))
            .find(|&pos| self.is_free(pos, grid_size))
    }

    /// Sample uniformly random cells until an unoccupied one is found.
    ///
    /// # Errors
    /// Returns an error if every cell of the grid is already occupied.
    pub fn find_unique_position<R: Rng + ?Sized>(
        &self,
        grid_size: i32,
        rng: &mut R,
    ) -> Result<Position> {
        let n_cells = (grid_size as usize).pow(2);
        if self.live.len() >= n_cells {
            bail!("no free cell left on a {grid_size}x{grid_size} grid");
        }

        let coord_dist = Uniform::new(0, grid_size)?;
        loop {
            let pos = Position::new(coord_dist.sample(rng), coord_dist.sample(rng));
            if self.occupant_at(pos).is_none() {
                return Ok(pos);
            }
        }
    }
}

#[cfg(test)]
impl Population {
    pub fn deceased_ids(&self) -> &[AgentId] {
        &self.deceased
    }

    pub fn is_live(&self, id: AgentId) -> bool {
        self.live.contains(&id)
    }
}
