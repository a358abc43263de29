use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::action::Direction;
use super::config::{Boundary, ModelConfig};
use super::species::{Species, SpeciesPair};

/// A position on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Move position by delta
    pub fn moved_by(&self, d_row: i32, d_col: i32) -> Self {
        Self {
            row: self.row + d_row,
            col: self.col + d_col,
        }
    }

    /// Move position in a direction
    pub fn moved_in_direction(&self, direction: Direction) -> Self {
        let (d_row, d_col) = direction.delta();
        self.moved_by(d_row, d_col)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Identifier of an agent, unique within one simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An agent on the grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub species: Species,
    pub position: Position,
    pub food_reserve: u32,
    /// 0 for agents placed at initialisation, parent + 1 for offspring
    pub generation: u32,
    pub alive: bool,
}

impl Agent {
    /// Species-prefixed identifier, e.g. `J_0000000000000007` for a predator
    pub fn tag(&self) -> String {
        format!("{}{:016x}", self.species.tag_prefix(), self.id.0)
    }
}

/// What an agent sees in one cell of its observation window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellView {
    Empty,
    Occupied { species: Species, food_reserve: u32 },
    /// Outside a bounded grid
    Wall,
}

/// Errors raised by grid mutations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("cell {position} is occupied by agent {occupant}")]
    OccupiedCell {
        position: Position,
        occupant: AgentId,
    },

    #[error("position {0} is outside the grid")]
    OutOfBounds(Position),

    #[error("agent {0} is not on the grid")]
    UnknownAgent(AgentId),
}

/// The grid, its agents and the simulation-wide generation counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    rows: usize,
    cols: usize,
    boundary: Boundary,
    cells: Vec<Option<AgentId>>,
    agents: BTreeMap<AgentId, Agent>,
    /// Live agents per species, kept in step with `agents`
    counts: SpeciesPair<usize>,
    next_id: u64,
    generation: u64,
    timestep: u64,
}

impl GridState {
    /// Create an empty grid
    pub fn empty(rows: usize, cols: usize, boundary: Boundary) -> Self {
        Self {
            rows,
            cols,
            boundary,
            cells: vec![None; rows * cols],
            agents: BTreeMap::new(),
            counts: SpeciesPair::default(),
            next_id: 0,
            generation: 0,
            timestep: 0,
        }
    }

    /// Populate a fresh grid according to the configured densities
    ///
    /// Each cell draws once for a predator and once for a prey. A predator
    /// takes precedence when both draws succeed, so no cell is ever shared.
    pub fn initialize<R: Rng + ?Sized>(config: &ModelConfig, rng: &mut R) -> Self {
        let mut grid = Self::empty(config.rows(), config.cols(), config.boundary);
        let food = config.initial_food_reserve();

        for row in 0..config.rows() {
            for col in 0..config.cols() {
                let predator_roll: f64 = rng.gen();
                let prey_roll: f64 = rng.gen();

                let species = if predator_roll < config.densities.predator {
                    Some(Species::Predator)
                } else if prey_roll < config.densities.prey {
                    Some(Species::Prey)
                } else {
                    None
                };

                if let Some(species) = species {
                    grid.place(species, Position::new(row as i32, col as i32), food, 0);
                }
            }
        }

        grid
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Carry the generation counter over from a previous grid
    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn timestep(&self) -> u64 {
        self.timestep
    }

    pub(crate) fn advance_timestep(&mut self) {
        self.timestep += 1;
    }

    /// Map a position onto the grid
    ///
    /// Toroidal grids wrap, bounded grids return `None` outside the edges.
    pub fn resolve(&self, pos: Position) -> Option<Position> {
        match self.boundary {
            Boundary::Toroidal => Some(Position::new(
                pos.row.rem_euclid(self.rows as i32),
                pos.col.rem_euclid(self.cols as i32),
            )),
            Boundary::Bounded => {
                let inside = pos.row >= 0
                    && pos.row < self.rows as i32
                    && pos.col >= 0
                    && pos.col < self.cols as i32;
                inside.then_some(pos)
            }
        }
    }

    fn index(&self, pos: Position) -> usize {
        pos.row as usize * self.cols + pos.col as usize
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub(crate) fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(&id)
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    /// Agent occupying a cell, if any
    pub fn agent_at(&self, pos: Position) -> Option<&Agent> {
        let pos = self.resolve(pos)?;
        self.cells[self.index(pos)].and_then(|id| self.agents.get(&id))
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn population(&self, species: Species) -> usize {
        *self.counts.get(species)
    }

    pub fn populations(&self) -> SpeciesPair<usize> {
        self.counts
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Live agents in row-major order of their cells
    pub fn agent_order(&self) -> Vec<AgentId> {
        self.cells.iter().filter_map(|cell| *cell).collect()
    }

    /// Place a new agent on a free cell
    ///
    /// # Errors
    ///
    /// [`GridError::OutOfBounds`] or [`GridError::OccupiedCell`].
    pub fn spawn(
        &mut self,
        species: Species,
        pos: Position,
        food_reserve: u32,
        generation: u32,
    ) -> Result<AgentId, GridError> {
        let pos = self.resolve(pos).ok_or(GridError::OutOfBounds(pos))?;
        if let Some(occupant) = self.cells[self.index(pos)] {
            return Err(GridError::OccupiedCell {
                position: pos,
                occupant,
            });
        }
        Ok(self.place(species, pos, food_reserve, generation))
    }

    fn place(&mut self, species: Species, pos: Position, food_reserve: u32, generation: u32) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;

        let idx = self.index(pos);
        self.cells[idx] = Some(id);
        *self.counts.get_mut(species) += 1;
        self.agents.insert(
            id,
            Agent {
                id,
                species,
                position: pos,
                food_reserve,
                generation,
                alive: true,
            },
        );
        id
    }

    /// Relocate an agent
    ///
    /// Moving onto the own cell (e.g. wrapping around a one-cell-wide torus) is a no-op.
    ///
    /// # Errors
    ///
    /// [`GridError::OccupiedCell`] when another live agent holds the target,
    /// [`GridError::OutOfBounds`] outside a bounded grid.
    pub fn move_agent(&mut self, id: AgentId, target: Position) -> Result<Position, GridError> {
        let from = self.agents.get(&id).ok_or(GridError::UnknownAgent(id))?.position;
        let to = self.resolve(target).ok_or(GridError::OutOfBounds(target))?;
        if to == from {
            return Ok(to);
        }

        let to_idx = self.index(to);
        if let Some(occupant) = self.cells[to_idx] {
            return Err(GridError::OccupiedCell {
                position: to,
                occupant,
            });
        }

        let from_idx = self.index(from);
        self.cells[from_idx] = None;
        self.cells[to_idx] = Some(id);
        if let Some(agent) = self.agents.get_mut(&id) {
            agent.position = to;
        }
        Ok(to)
    }

    /// Remove an agent, freeing its cell
    ///
    /// Returns the removed agent with `alive` cleared.
    pub fn remove(&mut self, id: AgentId) -> Result<Agent, GridError> {
        let mut agent = self.agents.remove(&id).ok_or(GridError::UnknownAgent(id))?;
        let idx = self.index(agent.position);
        self.cells[idx] = None;
        *self.counts.get_mut(agent.species) -= 1;
        agent.alive = false;
        Ok(agent)
    }

    /// Record a successful breeding event
    pub(crate) fn increment_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Square window of cells centred on an agent, in row-major order
    ///
    /// `side` must be odd. Cells beyond a bounded grid show up as [`CellView::Wall`],
    /// toroidal grids wrap.
    pub fn neighbours_of(&self, id: AgentId, side: usize) -> Result<Vec<CellView>, GridError> {
        let centre = self.agents.get(&id).ok_or(GridError::UnknownAgent(id))?.position;
        let radius = (side / 2) as i32;

        let mut window = Vec::with_capacity(side * side);
        for d_row in -radius..=radius {
            for d_col in -radius..=radius {
                let view = match self.resolve(centre.moved_by(d_row, d_col)) {
                    None => CellView::Wall,
                    Some(pos) => match self.cells[self.index(pos)].and_then(|id| self.agents.get(&id)) {
                        Some(agent) => CellView::Occupied {
                            species: agent.species,
                            food_reserve: agent.food_reserve,
                        },
                        None => CellView::Empty,
                    },
                };
                window.push(view);
            }
        }
        Ok(window)
    }

    /// Whether any of the eight neighbouring cells holds an agent of `species`
    pub fn has_adjacent(&self, pos: Position, species: Species) -> bool {
        Direction::NEIGHBOURS.iter().any(|dir| {
            let neighbour = pos.moved_in_direction(*dir);
            self.resolve(neighbour)
                .filter(|p| *p != pos)
                .and_then(|p| self.agent_at(p))
                .is_some_and(|agent| agent.species == species)
        })
    }
}
