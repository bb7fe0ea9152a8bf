pub mod dedup;
pub mod normalize;
pub mod sheet;

pub use dedup::{partition_new, ImportPartition};
pub use normalize::{normalize, ColumnMap, NormalizeError, NormalizedStatement};
pub use sheet::{load_csv, load_workbook, Cell, SheetError};

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Loads a statement file and normalizes it in one step. Delimited
/// exports go through the CSV reader, everything else through calamine.
pub fn read_statement(path: &Path) -> Result<NormalizedStatement, ImportError> {
    let is_csv = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv") || e.eq_ignore_ascii_case("txt"))
        .unwrap_or(false);

    let rows = if is_csv {
        let file = std::fs::File::open(path).map_err(SheetError::from)?;
        load_csv(std::io::BufReader::new(file))?
    } else {
        load_workbook(path)?
    };

    Ok(normalize(&rows)?)
}
