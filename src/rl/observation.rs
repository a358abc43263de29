use burn::tensor::{Tensor, TensorData, backend::Backend};

use super::policy::Observation;
use crate::sim::{AgentId, CellView, GridError, GridState, ModelConfig, Species};

/// Feature value of an empty cell
pub const EMPTY_CELL: f32 = 0.0;
/// Feature value of a cell holding a prey
pub const PREY_CELL: f32 = 1.0;
/// Feature value of a cell holding a predator
pub const PREDATOR_CELL: f32 = -1.0;
/// Feature value of a cell outside a bounded grid
pub const WALL_CELL: f32 = 0.5;

/// Encode a single window cell
pub fn encode_cell(view: CellView) -> f32 {
    match view {
        CellView::Empty => EMPTY_CELL,
        CellView::Occupied {
            species: Species::Prey,
            ..
        } => PREY_CELL,
        CellView::Occupied {
            species: Species::Predator,
            ..
        } => PREDATOR_CELL,
        CellView::Wall => WALL_CELL,
    }
}

/// Create the flattened observation of one agent
///
/// Layout: the `neighbourhood` window cells in row-major order (the agent itself
/// sits in the centre), followed by the agent's food reserve scaled to [0, 1].
///
/// Returns a vector of length `neighbourhood + 1`.
pub fn create_observation(
    grid: &GridState,
    id: AgentId,
    config: &ModelConfig,
) -> Result<Observation, GridError> {
    let agent = grid.agent(id).ok_or(GridError::UnknownAgent(id))?;
    let window = grid.neighbours_of(id, config.window_side())?;

    let mut features: Vec<f32> = window.into_iter().map(encode_cell).collect();
    features.push(agent.food_reserve as f32 / config.max_food_reserve as f32);

    Ok(Observation::new(features))
}

/// Batch of one observation: `[1, features]`
pub fn observation_tensor<B: Backend>(observation: &Observation, device: &B::Device) -> Tensor<B, 2> {
    let data = TensorData::new(observation.as_slice().to_vec(), [1, observation.len()]);
    Tensor::<B, 2>::from_data(data, device)
}

/// Batch from row-major flattened features: `[rows, width]`
pub fn batch_tensor<B: Backend>(
    features: Vec<f32>,
    rows: usize,
    width: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let data = TensorData::new(features, [rows, width]);
    Tensor::<B, 2>::from_data(data, device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Boundary, Position};
    use burn::backend::NdArray;
    use burn::backend::ndarray::NdArrayDevice;

    type TestBackend = NdArray<f32>;

    fn bounded_config() -> ModelConfig {
        ModelConfig {
            boundary: Boundary::Bounded,
            max_food_reserve: 4,
            ..ModelConfig::new(5, 5)
        }
    }

    #[test]
    fn test_observation_length() {
        let config = bounded_config();
        let mut grid = GridState::empty(5, 5, Boundary::Bounded);
        let id = grid.spawn(Species::Prey, Position::new(2, 2), 2, 0).unwrap();

        let obs = create_observation(&grid, id, &config).unwrap();
        assert_eq!(obs.len(), config.observation_size());

        let config = ModelConfig {
            neighbourhood: 25,
            ..bounded_config()
        };
        let obs = create_observation(&grid, id, &config).unwrap();
        assert_eq!(obs.len(), 26);
    }

    #[test]
    fn test_observation_encoding() {
        let config = bounded_config();
        let mut grid = GridState::empty(5, 5, Boundary::Bounded);
        let id = grid.spawn(Species::Prey, Position::new(0, 0), 2, 0).unwrap();
        grid.spawn(Species::Predator, Position::new(1, 1), 3, 0).unwrap();

        let obs = create_observation(&grid, id, &config).unwrap();
        let f = obs.as_slice();

        assert_eq!(f[0], WALL_CELL);
        assert_eq!(f[4], PREY_CELL); // self in the centre
        assert_eq!(f[5], EMPTY_CELL);
        assert_eq!(f[8], PREDATOR_CELL);
        assert!((f[9] - 0.5).abs() < 1e-6); // 2 / 4
    }

    #[test]
    fn test_toroidal_observation_has_no_walls() {
        let config = ModelConfig {
            boundary: Boundary::Toroidal,
            ..ModelConfig::new(4, 4)
        };
        let mut grid = GridState::empty(4, 4, Boundary::Toroidal);
        let id = grid.spawn(Species::Predator, Position::new(0, 0), 1, 0).unwrap();

        let obs = create_observation(&grid, id, &config).unwrap();
        assert!(obs.as_slice()[..9].iter().all(|&v| v != WALL_CELL));
    }

    #[test]
    fn test_unknown_agent() {
        let config = bounded_config();
        let grid = GridState::empty(5, 5, Boundary::Bounded);
        assert!(create_observation(&grid, AgentId(3), &config).is_err());
    }

    #[test]
    fn test_tensor_shapes() {
        let device = NdArrayDevice::default();
        let obs = Observation::new(vec![0.0; 10]);
        let single = observation_tensor::<TestBackend>(&obs, &device);
        assert_eq!(single.dims(), [1, 10]);

        let batch = batch_tensor::<TestBackend>(vec![0.0; 30], 3, 10, &device);
        assert_eq!(batch.dims(), [3, 10]);
    }
}
