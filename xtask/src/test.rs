use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

/// One `cargo test` invocation.
struct Suite {
    label: &'static str,
    args: &'static [&'static str],
    /// Failures are reported but do not fail the run.
    advisory: bool,
}

const UNIT: Suite = Suite {
    label: "Unit tests",
    args: &["test", "--workspace", "--lib", "--bins"],
    advisory: false,
};

const INTEGRATION: Suite = Suite {
    label: "Integration tests",
    args: &["test", "--workspace", "--test", "*"],
    advisory: false,
};

const DOC: Suite = Suite {
    label: "Doc tests",
    args: &["test", "--workspace", "--doc"],
    advisory: true,
};

pub fn run(unit_only: bool, integration_only: bool) -> Result<()> {
    println!();
    println!("{}", "🧪 Running tests...".cyan().bold());
    println!();

    let total_start = Instant::now();

    let mut suites = Vec::new();
    if !integration_only {
        suites.push(&UNIT);
    }
    if !unit_only {
        suites.push(&INTEGRATION);
    }
    suites.push(&DOC);

    for suite in suites {
        run_suite(suite)?;
    }

    println!(
        "{}",
        format!(
            "✓ All tests completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}

fn run_suite(suite: &Suite) -> Result<()> {
    println!("{}", format!("  Running {}...", suite.label.to_lowercase()).cyan());
    let start = Instant::now();

    let output = Command::new("cargo")
        // Property tests stay quick unless the caller asks for more cases.
        .env(
            "PROPTEST_CASES",
            std::env::var("PROPTEST_CASES").unwrap_or_else(|_| "64".to_string()),
        )
        .args(suite.args)
        .output()
        .with_context(|| format!("Failed to run {}", suite.label.to_lowercase()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if output.status.success() {
        println!(
            "{}",
            format!(
                "  ✓ {} passed {} in {:.2}s",
                suite.label,
                extract_test_summary(&stdout),
                start.elapsed().as_secs_f64()
            )
            .green()
        );
    } else if suite.advisory {
        eprintln!("{}", format!("  ⚠ {} failed", suite.label).yellow().bold());
    } else {
        eprintln!("{}", format!("  ✗ {} failed", suite.label).red().bold());
        eprintln!();
        for line in stdout.lines() {
            eprintln!("  {line}");
        }
        eprintln!("{}", String::from_utf8_lossy(&output.stderr));
        anyhow::bail!("{} failed", suite.label);
    }
    println!();
    Ok(())
}

/// Sum the `test result:` lines cargo prints per test binary.
fn extract_test_summary(output: &str) -> String {
    let mut passed = 0u32;
    let mut binaries = 0u32;
    for line in output.lines() {
        let Some(result) = line.split("test result:").nth(1) else {
            continue;
        };
        binaries = binaries.saturating_add(1);
        if let Some(n) = result
            .split(';')
            .find_map(|part| part.trim().strip_suffix(" passed"))
            .and_then(|n| n.rsplit(' ').next())
            .and_then(|n| n.parse::<u32>().ok())
        {
            passed = passed.saturating_add(n);
        }
    }
    if binaries == 0 {
        return "(summary not available)".to_string();
    }
    format!("({passed} passed across {binaries} binaries)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_sums_every_binary() {
        let out = "\
running 3 tests
test result: ok. 3 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out
running 5 tests
test result: ok. 5 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out
";
        assert_eq!(extract_test_summary(out), "(8 passed across 2 binaries)");
    }

    #[test]
    fn summary_without_results() {
        assert_eq!(extract_test_summary("error: no tests"), "(summary not available)");
    }
}
