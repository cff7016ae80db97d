//! Carry-forward gap filling.
//!
//! After a strategy has produced its sparse assignment, every sample that did
//! not get an image directly inherits the most recent image assigned before
//! it. Samples ahead of the first direct assignment stay unlabelled; nothing
//! is ever filled backwards.

use std::collections::BTreeMap;

use tracesync_store::Episode;

/// Expand `assignments` over positions `0..len`, carrying images forward.
///
/// Positions without a timestamp take part like any other position.
pub fn fill_gaps(assignments: &BTreeMap<usize, String>, len: usize) -> Vec<Option<String>> {
    let mut last: Option<&String> = None;
    (0..len)
        .map(|position| {
            if let Some(direct) = assignments.get(&position) {
                last = Some(direct);
            }
            last.cloned()
        })
        .collect()
}

/// Expand `assignments` over positions `0..len` without filling gaps.
pub fn direct_only(assignments: &BTreeMap<usize, String>, len: usize) -> Vec<Option<String>> {
    (0..len)
        .map(|position| assignments.get(&position).cloned())
        .collect()
}

/// Overwrite the image column of `episode` with `column`.
///
/// Samples past the end of `column` are cleared.
pub fn apply_images(episode: &mut Episode, column: Vec<Option<String>>) {
    let mut column = column.into_iter();
    for sample in &mut episode.trace {
        sample.image = column.next().flatten();
    }
}
