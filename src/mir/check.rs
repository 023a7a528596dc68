//! FileCheck-style test validation for MIR files.
//!
//! This module parses RUN and CHECK directives from MIR files and validates
//! the driver's output against them, in the manner of LLVM's FileCheck tool.
//!
//! Supported RUN commands:
//! - `relax [--pic] [--gp-disp] [--force-long-branch] [--skip-long-branch]
//!   [--lower-pseudos] [--stats]`
//! - `print` (parse and print back)
//! - `materialize <value> [--width N] [--end-in-add]`
//!
//! A command prefixed with `not` must fail; its error message is checked instead.

use crate::cpu0::Cpu0InstrInfo;
use crate::driver::{materialize_text, parse_value, relax_text, RelaxConfig};
use crate::relax::BranchExpansionOptions;

use super::{parse_functions, print_function};

/// A CHECK directive extracted from a MIR file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match on this or a later line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Must not appear before the next match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
    pub expect_failure: bool,
}

/// Test specification extracted from a MIR file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub mir_content: String,
}

impl TestSpec {
    /// Parse a MIR file to extract test specifications
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();
        let mut mir_lines = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run_cmd) = trimmed.strip_prefix("; RUN:") {
                let mut parts: Vec<&str> = run_cmd.split_whitespace().collect();
                let expect_failure = parts.first() == Some(&"not");
                if expect_failure {
                    parts.remove(0);
                }
                if parts.is_empty() {
                    return Err(format!("Empty RUN directive: '{}'", trimmed));
                }
                run_directives.push(RunDirective {
                    command: parts[0].to_string(),
                    args: parts[1..].iter().map(|s| s.to_string()).collect(),
                    expect_failure,
                });
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(pattern.trim().to_string()));
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("; COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            } else {
                // Regular MIR content
                mir_lines.push(line);
            }
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            mir_content: mir_lines.join("\n"),
        })
    }
}

/// Fail if any pending CHECK-NOT pattern occurs in `lines`.
fn check_not(pending: &mut Vec<&str>, lines: &[&str]) -> Result<(), String> {
    for pattern in pending.drain(..) {
        if let Some(line) = lines.iter().find(|line| line.contains(pattern)) {
            return Err(format!("CHECK-NOT: pattern '{}' found in '{}'", pattern, line));
        }
    }
    Ok(())
}

/// Test runner that executes MIR tests
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run a MIR test and validate output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        if spec.run_directives.is_empty() {
            return Err("No RUN directive".to_string());
        }

        for run_dir in &spec.run_directives {
            let output = match (self.execute_command(&spec.mir_content, run_dir), run_dir.expect_failure) {
                (Ok(output), false) => output,
                (Err(error), true) => error,
                (Ok(_), true) => {
                    return Err(format!("'{}' succeeded but was expected to fail", run_dir.command))
                }
                (Err(error), false) => return Err(format!("'{}' failed: {}", run_dir.command, error)),
            };
            if self.verbose {
                println!("{}", output);
            }
            self.validate_output(&output, &spec.check_directives)?;
        }

        Ok(())
    }

    /// Execute a test command and return the output
    fn execute_command(&self, mir: &str, run_dir: &RunDirective) -> Result<String, String> {
        match run_dir.command.as_str() {
            "relax" => {
                let mut config = RelaxConfig::default();
                let mut options = BranchExpansionOptions::new();
                for arg in &run_dir.args {
                    match arg.as_str() {
                        "--pic" => options = options.pic(true),
                        "--gp-disp" => options = options.global_base_reg(true),
                        "--force-long-branch" => options = options.force(true),
                        "--skip-long-branch" => options = options.skip(true),
                        "--lower-pseudos" => config.lower_pseudos = true,
                        "--stats" => config.print_stats = true,
                        other => return Err(format!("Unknown relax option '{}'", other)),
                    }
                }
                config.options = options;
                relax_text(mir, &config)
            }
            "print" => {
                let ii = Cpu0InstrInfo::new();
                let funcs = parse_functions(mir, &ii)?;
                Ok(funcs.iter().map(|f| print_function(f, &ii)).collect())
            }
            "materialize" => {
                let mut value = None;
                let mut width = 32;
                let mut end_in_add = false;
                let mut args = run_dir.args.iter();
                while let Some(arg) = args.next() {
                    match arg.as_str() {
                        "--end-in-add" => end_in_add = true,
                        "--width" => {
                            let w = args.next().ok_or("--width needs a value")?;
                            width = w.parse().map_err(|e| format!("Invalid width '{}': {}", w, e))?;
                        }
                        other => value = Some(parse_value(other)?),
                    }
                }
                let value = value.ok_or("materialize needs a value")?;
                materialize_text(value, width, end_in_add)
            }
            other => Err(format!("Unknown RUN command '{}'", other)),
        }
    }

    /// Validate output against CHECK directives
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> Result<(), String> {
        let output_lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<&str> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_not.push(pattern),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));

                    match found {
                        Some(idx) => {
                            check_not(&mut pending_not, &output_lines[line_idx..line_idx + idx])?;
                            line_idx += idx + 1; // Move to the next line after the match
                            if self.verbose {
                                println!("CHECK: '{}' found at line {}", pattern, line_idx - 1);
                            }
                        }
                        None => {
                            return Err(format!("CHECK: pattern '{}' not found in output", pattern));
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    if line_idx >= output_lines.len() {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    }

                    let line = output_lines[line_idx];
                    if !line.contains(pattern.as_str()) {
                        return Err(format!(
                            "CHECK-NEXT: expected '{}' but got '{}'",
                            pattern, line
                        ));
                    }
                    pending_not.clear();
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    if line_idx >= output_lines.len() {
                        continue; // End of output counts as empty
                    }

                    let line = output_lines[line_idx];
                    if !line.trim().is_empty() {
                        return Err(format!(
                            "CHECK-EMPTY: expected empty line but got '{}'",
                            line
                        ));
                    }
                    line_idx += 1;
                }
            }
        }

        check_not(&mut pending_not, &output_lines[line_idx.min(output_lines.len())..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let content = r#"; RUN: relax --force-long-branch
; RUN: not relax --pic
; CHECK-LABEL: f {
; CHECK-NEXT: entry:
; CHECK-NOT: jmp
; COM: This is a comment
f {
entry:
  ret $lr
}"#;

        let spec = TestSpec::parse(content).unwrap();
        assert_eq!(spec.run_directives.len(), 2);
        assert_eq!(spec.run_directives[0].args, vec!["--force-long-branch"]);
        assert!(spec.run_directives[1].expect_failure);
        assert_eq!(spec.check_directives.len(), 4);
        assert!(spec.mir_content.contains("f {"));
    }

    #[test]
    fn test_check_matching() {
        let runner = TestRunner::new(false);
        let output = "f {\nentry:\n  ret $lr\n}\n";

        let directives = vec![
            CheckDirective::CheckLabel("f {".to_string()),
            CheckDirective::CheckNext("entry:".to_string()),
            CheckDirective::CheckNot("jmp".to_string()),
            CheckDirective::Check("ret $lr".to_string()),
        ];

        runner.validate_output(output, &directives).unwrap();
    }

    #[test]
    fn test_check_not_failure() {
        let runner = TestRunner::new(false);
        let output = "a\njmp ^b\nc\n";

        let directives = vec![
            CheckDirective::Check("a".to_string()),
            CheckDirective::CheckNot("jmp".to_string()),
            CheckDirective::Check("c".to_string()),
        ];

        let err = runner.validate_output(output, &directives).unwrap_err();
        assert!(err.contains("CHECK-NOT"));
    }

    #[test]
    fn test_check_next_failure() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";

        let directives = vec![
            CheckDirective::Check("Line 1".to_string()),
            CheckDirective::CheckNext("Line 3".to_string()),
        ];

        let result = runner.validate_output(output, &directives);
        assert!(result.unwrap_err().contains("CHECK-NEXT"));
    }

    #[test]
    fn test_run_print() {
        let spec = TestSpec::parse(
            "; RUN: print\n; CHECK: entry:  ; bb.0, size 4, succs: none\nf {\nentry:\n  ret $lr\n}\n",
        )
        .unwrap();
        TestRunner::new(false).run_test(&spec).unwrap();
    }
}
