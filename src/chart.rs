//! Chart-ready projections of a summary.

use std::fmt::Write as _;

use crate::api::Summary;

/// Parallel category/count sequences; `categories[i]` pairs with `counts[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartSeries {
    pub categories: Vec<String>,
    pub counts: Vec<u64>,
}

pub fn to_series(summary: &Summary) -> ChartSeries {
    let (categories, counts) = summary
        .type_distribution
        .iter()
        .map(|(category, count)| (category.clone(), *count))
        .unzip();
    ChartSeries { categories, counts }
}

impl ChartSeries {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.categories
            .iter()
            .map(String::as_str)
            .zip(self.counts.iter().copied())
    }

    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Horizontal text bars scaled so the largest count spans `width` cells.
    pub fn render_bars(&self, width: usize) -> String {
        if self.is_empty() {
            return "No data available\n".to_string();
        }
        let label_width = self.categories.iter().map(|c| c.chars().count()).max().unwrap_or(0);
        let max = self.max_count().max(1);
        let mut out = String::new();
        for (category, count) in self.pairs() {
            let cells = ((count as f64 / max as f64) * width as f64).round() as usize;
            let _ = writeln!(
                out,
                "{:<label_width$} | {} {}",
                category,
                "#".repeat(cells),
                count,
            );
        }
        out
    }
}

/// Plain-text summary block shown next to the chart.
pub fn summary_text(summary: &Summary) -> String {
    let mut out = String::new();
    out.push_str("SUMMARY REPORT\n");
    out.push_str("----------------------------\n");
    let _ = writeln!(out, "Total Equipment: {}", summary.total_count);
    out.push('\n');

    out.push_str("Averages:\n");
    if summary.averages.is_empty() {
        out.push_str("    No average data available\n");
    }
    for (field, value) in &summary.averages {
        match value {
            Some(v) => {
                let _ = writeln!(out, "    • {}: {:.2}", field, v);
            }
            None => {
                let _ = writeln!(out, "    • {}: n/a", field);
            }
        }
    }

    out.push_str("Equipment Distribution:\n");
    if summary.type_distribution.is_empty() {
        out.push_str("    No distribution data available\n");
    }
    for (category, count) in &summary.type_distribution {
        let _ = writeln!(out, "    • {}: {}", category, count);
    }
    out
}
