use serde::{Deserialize, Serialize};
use std::fmt;

/// The two kinds of agents living on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    Predator,
    Prey,
}

impl Species {
    pub const ALL: [Species; 2] = [Species::Predator, Species::Prey];

    /// Prefix used when rendering agent identifiers
    pub fn tag_prefix(&self) -> &'static str {
        match self {
            Species::Predator => "J_",
            Species::Prey => "B_",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Species::Predator => "predator",
            Species::Prey => "prey",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per species
///
/// Used wherever the configuration or the simulation keeps a predator/prey pair,
/// e.g. densities, metabolism tables, policies and per-species statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeciesPair<T> {
    pub predator: T,
    pub prey: T,
}

impl<T> SpeciesPair<T> {
    pub fn new(predator: T, prey: T) -> Self {
        Self { predator, prey }
    }

    pub fn get(&self, species: Species) -> &T {
        match species {
            Species::Predator => &self.predator,
            Species::Prey => &self.prey,
        }
    }

    pub fn get_mut(&mut self, species: Species) -> &mut T {
        match species {
            Species::Predator => &mut self.predator,
            Species::Prey => &mut self.prey,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(Species, T) -> U) -> SpeciesPair<U> {
        SpeciesPair {
            predator: f(Species::Predator, self.predator),
            prey: f(Species::Prey, self.prey),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_access() {
        let mut pair = SpeciesPair::new(1, 2);
        assert_eq!(*pair.get(Species::Predator), 1);
        assert_eq!(*pair.get(Species::Prey), 2);

        *pair.get_mut(Species::Prey) += 10;
        assert_eq!(pair.prey, 12);
    }

    #[test]
    fn test_pair_map_passes_species() {
        let pair = SpeciesPair::new(0.5, 0.25).map(|species, v| (species, v * 2.0));
        assert_eq!(pair.predator, (Species::Predator, 1.0));
        assert_eq!(pair.prey, (Species::Prey, 0.5));
    }

    #[test]
    fn test_species_serde_names() {
        assert_eq!(serde_json::to_string(&Species::Predator).unwrap(), "\"predator\"");
        assert_eq!(
            serde_json::from_str::<Species>("\"prey\"").unwrap(),
            Species::Prey
        );
    }
}
