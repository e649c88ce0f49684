//! Plain-text renderings of evaluation traces and route tables.

use std::collections::HashSet;
use std::fmt::Write;

use crate::check::CheckResult;
use crate::error::Result;
use crate::evaluator::Evaluation;
use crate::snapshot::{RouteTable, TopologySnapshot};

const PASS_MARK: char = '✔';
const FAIL_MARK: char = '✖';

/// How much of each check result to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Verdict only
    Quiet,
    /// One line per check
    #[default]
    Verbose,
    /// Check lines followed by their metadata
    Debug,
}

/// Render check lines, one per result, in the order given.
pub fn render_results(results: &[CheckResult], verbosity: Verbosity) -> String {
    let mut out = String::new();
    if verbosity == Verbosity::Quiet {
        return out;
    }
    for result in results {
        let mark = if result.passed { PASS_MARK } else { FAIL_MARK };
        let _ = writeln!(out, "{} {}", mark, result.label);
        if verbosity == Verbosity::Debug {
            for (key, value) in &result.metadata {
                let _ = writeln!(out, "    {}: {}", key, value);
            }
        }
    }
    out
}

/// Render the check lines of an evaluation followed by its verdict.
pub fn render_evaluation(evaluation: &Evaluation, verbosity: Verbosity) -> String {
    let mut out = render_results(&evaluation.results, verbosity);
    let _ = writeln!(out, "{}", evaluation.verdict);
    out
}

/// Render route tables as aligned `RouteTableId Main Destination Target`
/// columns, one row per route.
pub fn render_route_tables(tables: &[&RouteTable]) -> String {
    let mut rows: Vec<[String; 4]> = vec![
        [
            "RouteTableId".to_string(),
            "Main".to_string(),
            "Destination".to_string(),
            "Target".to_string(),
        ],
        [
            "------------".to_string(),
            "----".to_string(),
            "-----------".to_string(),
            "------".to_string(),
        ],
    ];
    for table in tables {
        for route in &table.routes {
            rows.push([
                table.id.clone(),
                table.main.to_string(),
                route.destination.to_string(),
                route.target.to_string(),
            ]);
        }
    }

    let mut widths = [0usize; 4];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in &rows {
        let line = row
            .iter()
            .zip(widths.iter())
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

/// Render the route tables governing every subnet of an endpoint.
pub fn render_endpoint_route_tables(snapshot: &TopologySnapshot) -> Result<String> {
    let mut seen = HashSet::new();
    let mut tables = Vec::new();
    for subnet in &snapshot.endpoint.subnets {
        for table in snapshot.route_tables_for(subnet)? {
            if seen.insert(table.id.as_str()) {
                tables.push(table);
            }
        }
    }
    Ok(render_route_tables(&tables))
}
