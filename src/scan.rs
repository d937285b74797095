//! Recovers `GLOBAL_ASM(...)` blocks from a C source file and rewrites
//! the source so a non-cooperative compiler sees an ordinary function
//! body in their place.
//!
//! A `GLOBAL_ASM` block looks like:
//!
//! ```text
//! GLOBAL_ASM(
//! glabel my_function
//! /* a comment */ addu $4, $5, $6
//! jr $ra
//! )
//! ```
//!
//! and is replaced, line for line, with a placeholder function whose
//! body is sized to roughly match the compiled size of the real
//! assembly, so the placeholder symbol lands at a predictable address
//! relative to its neighbors in the compiler's output.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};
use crate::splice::SplicedFunction;

lazy_static! {
    static ref BLOCK_COMMENT: Regex = Regex::new(r"/\*.*?\*/").unwrap();
    static ref LINE_COMMENT: Regex = Regex::new(r"#.*").unwrap();
}

/// `(min_instr_count, skip_instr_count)` for each optimization profile:
/// a block must contain at least `min_instr_count` instructions, and
/// every instruction past the first `skip_instr_count` contributes one
/// placeholder statement to the generated function body.
fn thresholds(optimized: bool) -> (usize, usize) {
    if optimized {
        (2, 1)
    } else {
        (4, 4)
    }
}

/// The result of scanning one C source file.
pub struct ScanResult {
    /// The source with every `GLOBAL_ASM` block replaced by a
    /// placeholder function, one output line per input line.
    pub transformed: String,
    /// The recovered function list, in source order, ready to hand to
    /// [`crate::splice::splice_object`].
    pub functions: Vec<SplicedFunction>,
}

/// Parses `source`, returning both the placeholder-substituted source
/// text and the list of spliced functions it implies.
pub fn parse_source(source: &str, optimized: bool) -> Result<ScanResult> {
    let (min_instr_count, skip_instr_count) = thresholds(optimized);

    let mut in_asm = false;
    let mut instr_count = 0usize;
    let mut asm_conts: Vec<String> = Vec::new();
    let mut namectr = 0u32;
    let mut temp_fn_name = String::new();
    let mut fn_name: Option<String> = None;

    let mut functions = Vec::new();
    let mut transformed = String::new();

    for raw_line in source.lines() {
        let raw_line = raw_line.trim_end();
        let line = raw_line.trim_start();
        let mut output_line: Option<String> = None;

        if in_asm {
            if line.starts_with(')') {
                let name = fn_name.take().ok_or_else(|| {
                    Error::Malformed(format!(
                        "GLOBAL_ASM block closed before a glabel was seen (placeholder `{}`)",
                        temp_fn_name
                    ))
                })?;
                if instr_count < min_instr_count {
                    return Err(Error::Malformed(format!(
                        "GLOBAL_ASM block for `{}` has {} instructions, fewer than the required minimum of {}",
                        name, instr_count, min_instr_count
                    )));
                }
                in_asm = false;
                output_line = Some("}".to_string());
                functions.push(SplicedFunction {
                    fn_name: name,
                    temp_fn_name: temp_fn_name.clone(),
                    body_lines: std::mem::take(&mut asm_conts),
                    num_instr: instr_count,
                });
            } else {
                let stripped = BLOCK_COMMENT.replace_all(line, "");
                let stripped = LINE_COMMENT.replace_all(&stripped, "");
                let stripped = stripped.trim().to_string();

                if stripped.starts_with("glabel ") && fn_name.is_none() {
                    let name = stripped
                        .split_whitespace()
                        .nth(1)
                        .ok_or_else(|| Error::Malformed("glabel directive has no operand".into()))?;
                    fn_name = Some(name.to_string());
                }

                let is_directive_or_label =
                    stripped.starts_with("glabel ") || stripped.starts_with('.') || stripped.is_empty();
                if !is_directive_or_label {
                    if fn_name.is_none() {
                        return Err(Error::Malformed(
                            "GLOBAL_ASM block has an instruction before its glabel".into(),
                        ));
                    }
                    instr_count += 1;
                    if instr_count > skip_instr_count {
                        output_line = Some("*(volatile int*)0 = 0;".to_string());
                    }
                }

                asm_conts.push(stripped);
            }
        } else if line.starts_with("GLOBAL_ASM(") {
            in_asm = true;
            instr_count = 0;
            asm_conts = Vec::new();
            temp_fn_name = format!("tempfun{}", namectr);
            namectr += 1;
            fn_name = None;
            output_line = Some(format!("void {}(void) {{", temp_fn_name));
        } else {
            output_line = Some(raw_line.to_string());
        }

        transformed.push_str(output_line.as_deref().unwrap_or(""));
        transformed.push('\n');
    }

    if in_asm {
        return Err(Error::Malformed(format!(
            "GLOBAL_ASM block for placeholder `{}` was never closed",
            temp_fn_name
        )));
    }

    Ok(ScanResult { transformed, functions })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_ordinary_source_unchanged_line_for_line() {
        let src = "int main(void) {\n    return 0;\n}\n";
        let result = parse_source(src, false).unwrap();
        assert_eq!(result.transformed, src);
        assert!(result.functions.is_empty());
    }

    #[test]
    fn extracts_one_debug_profile_function() {
        let src = "GLOBAL_ASM(\nglabel my_fn\naddu $4, $5, $6\naddu $4, $5, $6\naddu $4, $5, $6\naddu $4, $5, $6\njr $ra\n)\n";
        let result = parse_source(src, false).unwrap();
        assert_eq!(result.functions.len(), 1);
        let f = &result.functions[0];
        assert_eq!(f.fn_name, "my_fn");
        assert_eq!(f.temp_fn_name, "tempfun0");
        assert_eq!(f.num_instr, 5);
        // 4 addu + 1 jr = 5 instructions, skip_instr_count=4, so only the
        // 5th instruction contributes a placeholder statement.
        let placeholder_count = result
            .transformed
            .matches("*(volatile int*)0 = 0;")
            .count();
        assert_eq!(placeholder_count, 1);
        assert!(result.transformed.contains("void tempfun0(void) {"));
    }

    #[test]
    fn optimized_profile_uses_lower_thresholds() {
        let src = "GLOBAL_ASM(\nglabel my_fn\nnop\nnop\n)\n";
        let result = parse_source(src, true).unwrap();
        assert_eq!(result.functions[0].num_instr, 2);
        // min=2 satisfied, skip=1, so the 2nd instruction emits a placeholder.
        assert_eq!(result.transformed.matches("*(volatile int*)0 = 0;").count(), 1);
    }

    #[test]
    fn strips_block_and_line_comments_from_asm() {
        let src = "GLOBAL_ASM(\nglabel my_fn\n/* hi */ nop # trailing\nnop\nnop\nnop\n)\n";
        let result = parse_source(src, false).unwrap();
        assert_eq!(result.functions[0].body_lines[1], "nop");
    }

    #[test]
    fn multiple_blocks_get_distinct_temp_names() {
        let src = "GLOBAL_ASM(\nglabel a\nnop\nnop\nnop\nnop\n)\nGLOBAL_ASM(\nglabel b\nnop\nnop\nnop\nnop\n)\n";
        let result = parse_source(src, false).unwrap();
        assert_eq!(result.functions.len(), 2);
        assert_eq!(result.functions[0].temp_fn_name, "tempfun0");
        assert_eq!(result.functions[1].temp_fn_name, "tempfun1");
    }

    #[test]
    fn rejects_block_below_minimum_instruction_count() {
        let src = "GLOBAL_ASM(\nglabel my_fn\nnop\n)\n";
        assert!(matches!(parse_source(src, false), Err(Error::Malformed(_))));
    }

    #[test]
    fn rejects_unterminated_block() {
        let src = "GLOBAL_ASM(\nglabel my_fn\nnop\nnop\nnop\nnop\n";
        assert!(matches!(parse_source(src, false), Err(Error::Malformed(_))));
    }

    #[test]
    fn preserves_line_count_for_diagnostics() {
        let src = "int a;\nGLOBAL_ASM(\nglabel f\nnop\nnop\nnop\nnop\n)\nint b;\n";
        let result = parse_source(src, false).unwrap();
        assert_eq!(result.transformed.lines().count(), src.lines().count());
    }
}
