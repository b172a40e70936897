use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{LinkError, NetworkLink};

/// Always-associated link with a wandering signal level
pub struct SimulatedLink {
    rng: StdRng,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkLink for SimulatedLink {
    fn network_name(&self) -> &str {
        "simulated"
    }

    fn is_associated(&self) -> bool {
        true
    }

    fn rssi(&mut self) -> i32 {
        self.rng.gen_range(-70..=-40)
    }

    fn begin(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}
