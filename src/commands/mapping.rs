use std::path::Path;

use crate::error::Result;
use crate::output::{self, Format};
use crate::store::mapping::MappingIndex;

pub fn show(path: &Path, format: Format) -> Result<()> {
    let index = MappingIndex::load(path)?;
    output::print_mapping(&index.snapshot(), format)?;

    let counts = index.counts();
    if format != Format::Json {
        eprintln!(
            "{} entries ({} existing, {} created)",
            index.len(),
            counts.existing,
            counts.created
        );
    }
    Ok(())
}
