use crate::config::ConfigErrors;

/// One unit of dispatch work: an ordered subset of the input list with a
/// stable, zero-based index. Created by `partition`, never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub items: Vec<String>,
}

/// Split an ordered input list into chunks of `files_per_job` items.
///
/// The last chunk holds the remainder. In debug mode the whole list becomes a
/// single chunk so an operator can preview the full set as one local job, and
/// `files_per_job` is not validated in that case.
pub fn partition(
    items: &[String],
    files_per_job: usize,
    debug: bool,
) -> Result<Vec<Chunk>, ConfigErrors> {
    if items.is_empty() {
        // nothing to do is a valid outcome, not an error
        return Ok(Vec::new());
    }

    if debug {
        return Ok(vec![Chunk {
            index: 0,
            items: items.to_vec(),
        }]);
    }

    if files_per_job == 0 {
        return Err(ConfigErrors::InvalidChunkSize(files_per_job));
    }

    Ok(items
        .chunks(files_per_job)
        .enumerate()
        .map(|(index, items)| Chunk {
            index,
            items: items.to_vec(),
        })
        .collect())
}
