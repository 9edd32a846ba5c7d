use rand::Rng;
use serde::{Deserialize, Serialize};

/// Cell coordinates on the grid.
///
/// Proposed steps may fall outside the grid, so coordinates are signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Whether the position lies inside a `grid_size x grid_size` grid.
    pub fn within(&self, grid_size: i32) -> bool {
        (0..grid_size).contains(&self.x) && (0..grid_size).contains(&self.y)
    }
}

/// Agent that can carry, transmit and die of the infection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Carrier {
    healthy: bool,
    infection_age: u32,
    max_infection_age: u32,
}

impl Carrier {
    pub fn new(infected: bool, max_infection_age: u32) -> Self {
        Self {
            healthy: !infected,
            infection_age: 0,
            max_infection_age,
        }
    }

    pub fn is_infected(&self) -> bool {
        !self.healthy
    }

    pub fn infection_age(&self) -> u32 {
        self.infection_age
    }

    pub fn tick_infection_age(&mut self) {
        self.infection_age += 1;
    }

    pub fn is_passed_away(&self) -> bool {
        self.infection_age >= self.max_infection_age
    }

    /// Take on the health of `other`.
    ///
    /// Contact with a healthy carrier also leaves this one healthy.
    pub fn expose_to(&mut self, other: &Carrier) {
        self.healthy = !other.is_infected();
    }

    pub fn receive_cure(&mut self) {
        self.healthy = true;
        self.infection_age = 0;
    }
}

/// Agent that cures infected carriers on contact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Curer;

impl Curer {
    /// Cure `carrier`. Always succeeds.
    pub fn cure(&self, carrier: &mut Carrier) {
        carrier.receive_cure();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Kind {
    Carrier(Carrier),
    Curer(Curer),
}

/// Mobile agent of the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pos: Position,
    kind: Kind,
}

impl Agent {
    pub fn carrier(pos: Position, carrier: Carrier) -> Self {
        Self {
            pos,
            kind: Kind::Carrier(carrier),
        }
    }

    pub fn curer(pos: Position) -> Self {
        Self {
            pos,
            kind: Kind::Curer(Curer),
        }
    }

    pub fn pos(&self) -> Position {
        self.pos
    }

    pub fn set_pos(&mut self, pos: Position) {
        self.pos = pos;
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn as_carrier(&self) -> Option<&Carrier> {
        match &self.kind {
            Kind::Carrier(carrier) => Some(carrier),
            Kind::Curer(_) => None,
        }
    }

    pub fn as_carrier_mut(&mut self) -> Option<&mut Carrier> {
        match &mut self.kind {
            Kind::Carrier(carrier) => Some(carrier),
            Kind::Curer(_) => None,
        }
    }

    /// Propose a diagonal step from the current position.
    ///
    /// Each axis moves by -1 or +1 with equal probability. No bounds checking.
    pub fn step<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        let dx = if rng.random_bool(0.5) { 1 } else { -1 };
        let dy = if rng.random_bool(0.5) { 1 } else { -1 };
        Position::new(self.pos.x + dx, self.pos.y + dy)
    }
}
