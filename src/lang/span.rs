use serde::{Deserialize, Serialize};

/// A region of source text, used for editor highlighting and for the
/// debugger's program pointer.
///
/// Lines and columns are 1-based, like the lexer spans they come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRange {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourceRange {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// A range covering a single line.
    pub fn line(line: u32, start_column: u32, end_column: u32) -> Self {
        Self::new(line, start_column, line, end_column)
    }

    pub fn contains_line(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    pub fn same_start(&self, other: &SourceRange) -> bool {
        self.start_line == other.start_line && self.start_column == other.start_column
    }
}

/// Accumulates the range of something assembled piece by piece (a Step, a
/// container snippet): the start is fixed by the first piece that has a
/// range, the end only ever moves forward.
pub fn accumulate(target: &mut Option<SourceRange>, piece: Option<&SourceRange>) {
    let Some(piece) = piece else { return };
    match target {
        None => *target = Some(*piece),
        Some(current) => extend_end(current, piece),
    }
}

fn extend_end(current: &mut SourceRange, piece: &SourceRange) {
    if (piece.end_line, piece.end_column) > (current.end_line, current.end_column) {
        current.end_line = piece.end_line;
        current.end_column = piece.end_column;
    }
}

impl std::fmt::Display for SourceRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_keeps_first_start() {
        let mut range = None;
        accumulate(&mut range, Some(&SourceRange::line(3, 5, 9)));
        accumulate(&mut range, Some(&SourceRange::line(2, 1, 4)));
        accumulate(&mut range, Some(&SourceRange::line(4, 1, 7)));

        assert_eq!(range, Some(SourceRange::new(3, 5, 4, 7)));
    }

    #[test]
    fn test_accumulate_ignores_missing_piece() {
        let mut range = None;
        accumulate(&mut range, None);
        assert_eq!(range, None);
    }
}
