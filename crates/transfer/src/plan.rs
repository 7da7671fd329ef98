use crate::PlanError;
use crate::layout::TempLayout;
use crate::types::{ByteRange, Part};

/// Splits `file_size` bytes into consecutive ranges of `part_size` bytes.
///
/// Only the last range may be shorter. A zero-byte file yields a single
/// empty range so every job still produces exactly one part.
pub fn plan_ranges(file_size: i64, part_size: i64) -> Result<Vec<ByteRange>, PlanError> {
    if file_size < 0 {
        return Err(PlanError::InvalidSize(format!(
            "file size must not be negative: {file_size}"
        )));
    }
    if part_size <= 0 {
        return Err(PlanError::InvalidSize(format!(
            "part size must be positive: {part_size}"
        )));
    }

    let file_size = file_size as u64;
    let part_size = part_size as u64;

    if file_size == 0 {
        return Ok(vec![ByteRange::new(0, 0)]);
    }

    let count = file_size.div_ceil(part_size);
    let ranges = (0..count)
        .map(|i| {
            let start = i * part_size;
            let len = part_size.min(file_size - start);
            ByteRange::new(start, len)
        })
        .collect();
    Ok(ranges)
}

/// Plans the parts of a job, assigning each its temp path in `layout`.
pub fn plan_parts(
    file_size: i64,
    part_size: i64,
    layout: &TempLayout,
) -> Result<Vec<Part>, PlanError> {
    let parts = plan_ranges(file_size, part_size)?
        .into_iter()
        .enumerate()
        .map(|(index, range)| Part {
            index,
            range,
            temp_path: layout.part_path(index),
        })
        .collect();
    Ok(parts)
}
