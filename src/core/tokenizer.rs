//! Raw line tokenization
//!
//! Splits an interactive line into one argv per pipeline stage. Quoting follows
//! the usual shell conventions without expansion: `'` and `"` open regions closed
//! only by the same character, and a backslash takes the next character verbatim
//! anywhere in the line. Inside a quoted region a quote character that directly
//! follows a backslash is literal, even when that backslash was itself escaped, so
//! `"a\\" b"` stays one field.

use crate::error::{EngineError, Result};
use tracing::{debug, instrument};

const PIPE: char = '|';
const ESCAPE: char = '\\';

/// Tokenize a raw line into pipeline stages
#[instrument]
pub fn tokenize(line: &str) -> Result<Vec<Vec<String>>> {
    if line.trim().is_empty() {
        return Err(EngineError::EmptyCommand);
    }

    let mut stages: Vec<Vec<String>> = Vec::new();
    let mut argv: Vec<String> = Vec::new();
    let mut field = String::new();
    // Distinguishes an empty quoted field from no field at all
    let mut in_field = false;
    let mut quote: Option<char> = None;
    // Last raw character taken, after escape processing
    let mut last: Option<char> = None;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        let previous = last.replace(ch);
        if ch == ESCAPE {
            match chars.next() {
                Some(escaped) => {
                    field.push(escaped);
                    in_field = true;
                    last = Some(escaped);
                }
                None => {
                    return Err(EngineError::malformed(
                        "trailing escape character at end of input",
                        Some(ESCAPE),
                    ));
                }
            }
            continue;
        }

        if let Some(open) = quote {
            if ch == open && previous != Some(ESCAPE) {
                quote = None;
            } else {
                field.push(ch);
            }
            continue;
        }

        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                in_field = true;
            }
            PIPE => {
                flush_field(&mut argv, &mut field, &mut in_field);
                if argv.is_empty() {
                    return Err(EngineError::EmptyCommand);
                }
                stages.push(std::mem::take(&mut argv));
            }
            c if c.is_whitespace() => flush_field(&mut argv, &mut field, &mut in_field),
            c => {
                field.push(c);
                in_field = true;
            }
        }
    }

    if let Some(open) = quote {
        return Err(EngineError::malformed(
            format!("unmatched quote {open}"),
            Some(open),
        ));
    }

    flush_field(&mut argv, &mut field, &mut in_field);
    if argv.is_empty() {
        return Err(EngineError::EmptyCommand);
    }
    stages.push(argv);

    debug!("Tokenized {} pipeline stage(s): {:?}", stages.len(), stages);
    Ok(stages)
}

fn flush_field(argv: &mut Vec<String>, field: &mut String, in_field: &mut bool) {
    if *in_field {
        argv.push(std::mem::take(field));
        *in_field = false;
    }
}
