//! Results output formatting (CSV).

use crate::analysis::SimulationResult;
use crate::error::Result;
use std::io::Write;

/// Write the space-time history as CSV.
///
/// Format: a header row with the grid coordinates, then one row per step
/// with its simulation time. `reverse_space` flips the spatial axis of both
/// the header and the rows.
/// ```csv
/// t,0,1.5075,3.0151,...
/// 0.002284,0.0,0.0,0.0,...
/// ```
pub fn write_history_csv<W: Write>(
    result: &SimulationResult,
    writer: &mut W,
    reverse_space: bool,
) -> Result<()> {
    let mut grid = result.grid.clone();
    let rows = if reverse_space {
        grid.reverse();
        result.history.spatially_reversed()
    } else {
        result.history.rows().to_vec()
    };

    write!(writer, "t")?;
    for x in &grid {
        write!(writer, ",{}", x)?;
    }
    writeln!(writer)?;

    for (t, row) in result.times().iter().zip(&rows) {
        write!(writer, "{}", t)?;
        for u in row {
            write!(writer, ",{}", u)?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Write the scalar run metadata as `key,value` CSV.
pub fn write_summary<W: Write>(result: &SimulationResult, writer: &mut W) -> Result<()> {
    writeln!(writer, "Quantity,Value")?;
    writeln!(writer, "strategy,{}", result.strategy)?;
    writeln!(writer, "ranks,{}", result.num_ranks)?;
    writeln!(writer, "grid_points,{}", result.grid.len())?;
    writeln!(writer, "grid_spacing,{}", result.grid_spacing)?;
    writeln!(writer, "time_step,{}", result.time_step)?;
    writeln!(writer, "steps,{}", result.step_count())?;
    writeln!(writer, "elapsed_seconds,{}", result.elapsed_seconds)?;
    Ok(())
}

/// One rank's startup greeting.
pub fn hello_line(rank: usize, num_ranks: usize, processor_name: &str) -> String {
    format!("Hello, World! I am process {rank} of {num_ranks} on {processor_name}.")
}
