//! Insert/read-back soak over binary column names and values
//!
//! Every iteration writes `age\r\n = 40\r\n` into row `joe` of
//! `Keyspace1/Standard2` at `ONE` and reads it back, checking both the bytes
//! and the lengths.

use anyhow::{anyhow, bail, Result};
use cassie_core::{Column, ConsistencyLevel, Session};
use tracing::{debug, info};

pub const KEYSPACE: &str = "Keyspace1";
pub const COLUMN_FAMILY: &str = "Standard2";
pub const KEY: &[u8] = b"joe";
pub const NAME: &[u8] = b"age\r\n";
pub const VALUE: &[u8] = b"40\r\n";

/// Run `iterations` insert + get cycles on one session
pub fn run_generation(session: &mut Session, iterations: usize) -> Result<()> {
    for iteration in 0..iterations {
        // Fresh per round trip
        let column = Column::new(NAME, VALUE, 0);
        session.insert(KEYSPACE, COLUMN_FAMILY, KEY, &column, ConsistencyLevel::One)?;

        let read = session
            .get(KEYSPACE, COLUMN_FAMILY, KEY, NAME, ConsistencyLevel::One)?
            .ok_or_else(|| anyhow!("Column not found after insert (iteration {})", iteration))?;

        verify(&read, iteration)?;
        drop(column);
    }

    debug!("Generation finished: {} iterations", iterations);
    Ok(())
}

/// Open a fresh session per generation and soak each one
pub fn run<F>(mut open: F, generations: u64, iterations: usize) -> Result<()>
where
    F: FnMut() -> Result<Session>,
{
    for generation in 0..generations {
        let mut session = open()?;
        run_generation(&mut session, iterations)?;
        info!("Generation {} passed ({} round trips)", generation, iterations);
    }
    Ok(())
}

fn verify(column: &Column, iteration: usize) -> Result<()> {
    if column.name().len() != NAME.len() {
        bail!(
            "Name length mismatch at iteration {}: expected {}, got {}",
            iteration,
            NAME.len(),
            column.name().len()
        );
    }

    if column.name().as_bytes() != NAME {
        bail!(
            "Name mismatch at iteration {}: got {:?}",
            iteration,
            column.name()
        );
    }

    if column.value().len() != VALUE.len() {
        bail!(
            "Value length mismatch at iteration {}: expected {}, got {}",
            iteration,
            VALUE.len(),
            column.value().len()
        );
    }

    if column.value().as_bytes() != VALUE {
        bail!(
            "Value mismatch at iteration {}: got {:?}",
            iteration,
            column.value()
        );
    }

    Ok(())
}
