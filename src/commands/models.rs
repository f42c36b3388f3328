//! Models commands - check exported ONNX artifacts and compare dumped outputs

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use std::path::Path;

use super::utils::{self, dimmed, green, red, yellow};
use devtools_helper::models::{self, CheckStatus, CompareOptions};

fn status_label(status: CheckStatus) -> String {
    match status {
        CheckStatus::Ok => green("OK"),
        CheckStatus::Warn => yellow("WARN"),
        CheckStatus::Fail => red("FAIL"),
    }
}

fn opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.*}", precision, v))
}

fn pass_label(passed: bool) -> String {
    if passed {
        green("pass")
    } else {
        red("FAIL")
    }
}

/// `models verify`; returns the exit code
pub fn verify(dir: &Path) -> Result<i32> {
    let report = models::verify(dir)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("File"),
        Cell::new("Status"),
        Cell::new("Size"),
        Cell::new("SHA-256"),
        Cell::new("Detail"),
    ]);
    for check in &report.checks {
        table.add_row(vec![
            Cell::new(check.name),
            Cell::new(status_label(check.status)),
            Cell::new(check.size.map(utils::format_size).unwrap_or_default()),
            Cell::new(
                check
                    .sha256
                    .as_deref()
                    .map(|h| utils::truncate(h, 19))
                    .unwrap_or_default(),
            ),
            Cell::new(&check.detail),
        ]);
    }
    println!("{}", report.dir.display());
    println!("{}", table);

    if let Some(config) = &report.config {
        println!(
            "  model_type: {}  hidden_size: {}  max_position_embeddings: {}",
            config.model_type.as_deref().unwrap_or("-"),
            config.hidden_size.map_or("-".to_string(), |v| v.to_string()),
            config
                .max_position_embeddings
                .map_or("-".to_string(), |v| v.to_string())
        );
    }

    if report.passed() {
        println!("{}", green("Model directory looks good"));
        Ok(0)
    } else {
        eprintln!("{} required checks failed", red("Failed:"));
        Ok(1)
    }
}

/// `models compare`; returns the exit code
pub fn compare(a: &Path, b: &Path, options: CompareOptions) -> Result<i32> {
    let outputs_a = models::load_outputs(a)?;
    let outputs_b = models::load_outputs(b)?;
    let report = models::compare(&outputs_a, &outputs_b, &options);

    println!(
        "Comparing {} vs {}",
        utils::bold(&report.model_a),
        utils::bold(&report.model_b)
    );

    if !report.embeddings.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Input"),
            Cell::new("Dims"),
            Cell::new("Cosine"),
            Cell::new("Max diff"),
            Cell::new("Norm ratio"),
            Cell::new("Result"),
        ]);
        for row in &report.embeddings {
            table.add_row(vec![
                Cell::new(utils::truncate(&row.input, 40)),
                Cell::new(format!("{}/{}", row.dim_a, row.dim_b)),
                Cell::new(opt(row.cosine, 6)),
                Cell::new(opt(row.max_abs_diff, 6)),
                Cell::new(opt(row.norm_ratio, 4)),
                Cell::new(pass_label(row.passed)),
            ]);
        }
        println!("\nEmbeddings\n{}", table);
        println!(
            "  mean cosine: {}  min cosine: {}  (threshold {})",
            opt(report.mean_cosine(), 6),
            opt(report.min_cosine(), 6),
            options.min_cosine
        );
    }

    if !report.scores.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Input"),
            Cell::new("Max diff"),
            Cell::new(format!("Top-{} agreement", options.top_k)),
            Cell::new("Result"),
        ]);
        for row in &report.scores {
            table.add_row(vec![
                Cell::new(utils::truncate(&row.input, 40)),
                Cell::new(opt(row.max_abs_diff, 6)),
                Cell::new(format!("{:.0}%", row.top_k_agreement * 100.0)),
                Cell::new(pass_label(row.passed)),
            ]);
        }
        println!("\nScores\n{}", table);
    }

    for input in &report.unmatched {
        println!("{} unmatched input: {}", yellow("Warning:"), dimmed(input));
    }

    if report.is_empty() {
        eprintln!("{} no comparable outputs", red("Failed:"));
        return Ok(1);
    }
    if report.passed() {
        println!("\n{}", green("PASSED"));
        Ok(0)
    } else {
        println!("\n{}", red("FAILED"));
        Ok(1)
    }
}
