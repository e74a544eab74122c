use std::path::Path;

use crate::fitting::prelude::*;
use crate::heuristic::prelude::*;

/// Hard bounds for the optimizer, in BADS coordinates.
pub const LOWER_BOUNDS: [f64; BADS_PARAMETER_COUNT] =
    [0.1, 0.001, 0.0, 0.0, 0.25, -10.0, -10.0, -10.0, -10.0, -10.0];
pub const UPPER_BOUNDS: [f64; BADS_PARAMETER_COUNT] =
    [10.0, 1.0, 1.0, 1.0, 4.0, 10.0, 10.0, 10.0, 10.0, 10.0];

/// Plausible bounds: the region the optimizer scales its exploration to.
pub const PLAUSIBLE_LOWER_BOUNDS: [f64; BADS_PARAMETER_COUNT] =
    [1.0, 0.1, 0.001, 0.05, 0.5, -5.0, -5.0, -5.0, -5.0, -5.0];
pub const PLAUSIBLE_UPPER_BOUNDS: [f64; BADS_PARAMETER_COUNT] =
    [9.99, 0.99, 0.5, 0.5, 2.0, 5.0, 5.0, 5.0, 5.0, 5.0];

/// Parses a comma-separated 10-entry BADS vector.
pub fn parse_bads_parameter_line(line: &str) -> Result<Vec<f64>> {
    let values = line
        .trim()
        .split(',')
        .map(|token| {
            token
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid parameter vector: bad entry {token}"))
        })
        .collect::<Result<Vec<f64>>>()?;
    if values.len() != BADS_PARAMETER_COUNT {
        return Err(anyhow!(
            "invalid parameter vector: expected {BADS_PARAMETER_COUNT} parameters, received {}",
            values.len()
        ));
    }
    Ok(values)
}

/// Reads a parameter file — first non-comment line, `#` comments — and
/// expands it into the full 58-entry model vector.
pub fn parse_bads_parameter_file_to_model_parameters(path: &Path) -> Result<Vec<f64>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read parameter file {}", path.display()))?;
    for line in content.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        return bads_to_model_parameters(&parse_bads_parameter_line(line)?);
    }
    Err(anyhow!("invalid parameter vector: {} contains no parameter line", path.display()))
}
