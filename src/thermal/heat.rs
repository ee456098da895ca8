use crate::block::{Block, AMBIENT_TEMPERATURE};

/// Heat generated at full load above ambient
const LOAD_HEAT_RANGE: f64 = 10.0;

/// Weight of a block's own generated heat in the neighbor blend
const SELF_WEIGHT: f64 = 0.6;

/// Weight of the neighbor average in the blend
const NEIGHBOR_WEIGHT: f64 = 0.4;

/// Fraction of the excess over ambient that survives one cooling step
const COOLING_RETENTION: f64 = 0.9;

/// Heat baseline for a load: 0 maps to ambient (20), 100 to 30
pub fn generated_heat(dynamic_load: f64) -> f64 {
    (dynamic_load / 100.0) * LOAD_HEAT_RANGE + AMBIENT_TEMPERATURE
}

/// Next temperature for `block`
///
/// `neighbor_temps` are the neighbors' values from the tick-start snapshot,
/// never values computed earlier in the same tick.
pub fn next_temperature(block: &Block, neighbor_temps: &[f64]) -> f64 {
    let generated = generated_heat(block.dynamic_load);

    let blended = if neighbor_temps.is_empty() {
        generated
    } else {
        let avg = neighbor_temps.iter().sum::<f64>() / neighbor_temps.len() as f64;
        SELF_WEIGHT * generated + NEIGHBOR_WEIGHT * avg
    };

    AMBIENT_TEMPERATURE + (blended - AMBIENT_TEMPERATURE) * COOLING_RETENTION
}
