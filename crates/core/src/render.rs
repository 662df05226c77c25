use crate::engine::{EngineRow, QueryOutput};

/// Bounded, countable view of one executed statement, ready for a
/// display layer. Rows keep their original order; sorting belongs to
/// the display layer, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultView {
    columns: Vec<String>,
    rows: Vec<EngineRow>,
    total_count: u64,
}

impl ResultView {
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[EngineRow] {
        &self.rows
    }

    #[must_use]
    pub fn rendered_count(&self) -> usize {
        self.rows.len()
    }

    /// Backend-reported total; `total_count() >= rendered_count()`.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Showing {} of {} records",
            self.rendered_count(),
            self.total_count
        )
    }
}

/// Materializes the first `min(render_cap, row_count)` rows and keeps
/// the true total alongside. An empty result set yields an empty view
/// without erroring.
#[must_use]
pub fn render(output: QueryOutput, render_cap: usize) -> ResultView {
    assert!(render_cap > 0, "render cap must be greater than 0");

    let QueryOutput {
        columns,
        mut rows,
        row_count,
    } = output;
    rows.truncate(render_cap);

    ResultView {
        columns,
        rows,
        total_count: row_count,
    }
}
