/// Direction an action is aimed at, covering the Moore neighbourhood plus the own cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Stay,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 9] = [
        Direction::Stay,
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// The eight directions pointing at a neighbouring cell
    pub const NEIGHBOURS: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Returns the delta (d_row, d_col) for this direction
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Stay => (0, 0),
            Direction::North => (-1, 0),
            Direction::NorthEast => (-1, 1),
            Direction::East => (0, 1),
            Direction::SouthEast => (1, 1),
            Direction::South => (1, 0),
            Direction::SouthWest => (1, -1),
            Direction::West => (0, -1),
            Direction::NorthWest => (-1, -1),
        }
    }

    fn index(&self) -> usize {
        Direction::ALL
            .iter()
            .position(|d| d == self)
            .unwrap_or_default()
    }
}

/// What the agent tries to do with the targeted cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Move,
    Eat,
    Breed,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::Move, Intent::Eat, Intent::Breed];
}

/// A discrete action: an intent aimed at a direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action {
    pub intent: Intent,
    pub direction: Direction,
}

impl Action {
    /// Width of the policy's action head
    pub const COUNT: usize = Intent::ALL.len() * Direction::ALL.len();

    pub fn new(intent: Intent, direction: Direction) -> Self {
        Self { intent, direction }
    }

    /// Convert a discrete action index into an action
    ///
    /// Index layout is `intent * 9 + direction`, with intents ordered
    /// Move, Eat, Breed and directions ordered as [`Direction::ALL`].
    /// Out-of-range indices map to staying in place.
    pub fn from_index(idx: usize) -> Self {
        if idx >= Self::COUNT {
            return Self::new(Intent::Move, Direction::Stay);
        }
        let per_intent = Direction::ALL.len();
        Self {
            intent: Intent::ALL[idx / per_intent],
            direction: Direction::ALL[idx % per_intent],
        }
    }

    pub fn index(&self) -> usize {
        let intent = match self.intent {
            Intent::Move => 0,
            Intent::Eat => 1,
            Intent::Breed => 2,
        };
        intent * Direction::ALL.len() + self.direction.index()
    }
}
