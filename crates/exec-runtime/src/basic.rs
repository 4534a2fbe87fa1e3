//! A small control-statement language.
//!
//! ```text
//! @[label:]MNEMONIC[,options] [field[,field...]]
//! ```
//!
//! A trailing `;` continues the statement on the next image. Recognized
//! statements: `LOG`, `MSG`, `ASG`, `FREE`, `USE`, `JUMP`, `SKIP`, `FIN`.
//! Any other well-formed name is a processor call.

use async_trait::async_trait;

use exec_console::{ConsoleLog, ConsoleLogEntry, ConsoleLogKind, Destination, MessageGroup};
use exec_core::ident;

use crate::interpreter::{
    Interpretation, Interpreter, ParsedStatement, StatementContext, StatementOutcome,
};
use crate::run::{PinnedRun, RunKind};

const STATEMENTS: [&str; 8] = ["LOG", "MSG", "ASG", "FREE", "USE", "JUMP", "SKIP", "FIN"];

#[derive(Debug, Default, Clone, Copy)]
pub struct BasicInterpreter;

impl BasicInterpreter {
    pub fn new() -> Self {
        Self
    }
}

/// Join continued images into one statement, or report that more are due.
fn join_images(images: &[String]) -> Option<String> {
    let mut text = String::new();
    for (i, image) in images.iter().enumerate() {
        let line = image.trim_end();
        let (part, continued) = match line.strip_suffix(';') {
            Some(part) => (part, true),
            None => (line, false),
        };
        if i > 0 {
            text.push(' ');
            text.push_str(part.trim_start());
        } else {
            text.push_str(part);
        }
        if continued && i + 1 == images.len() {
            return None;
        }
    }
    Some(text)
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn parse(text: &str) -> Interpretation {
    let Some(rest) = text.strip_prefix('@') else {
        return Interpretation::NotControlStatement;
    };
    let rest = rest.trim_start();

    let mut label = None;
    let mut rest = rest;
    if let Some(i) = rest.find([':', ' ', ',']) {
        if rest[i..].starts_with(':') {
            let candidate = &rest[..i];
            if !is_word(candidate) || candidate.len() > ident::MAX_IDENT_LEN {
                return Interpretation::Error(format!("ILLEGAL LABEL {candidate}"));
            }
            label = Some(candidate.to_ascii_uppercase());
            rest = rest[i + 1..].trim_start();
        }
    }

    if rest.is_empty() {
        return Interpretation::Error("MISSING STATEMENT NAME".into());
    }
    let (word, operands) = match rest.find(char::is_whitespace) {
        Some(i) => (&rest[..i], rest[i..].trim()),
        None => (rest, ""),
    };
    let (mnemonic, options) = word.split_once(',').unwrap_or((word, ""));
    if !is_word(mnemonic) {
        return Interpretation::Error(format!("ILLEGAL STATEMENT NAME {mnemonic}"));
    }
    if !options.is_empty() && !is_word(options) {
        return Interpretation::Error(format!("ILLEGAL OPTIONS {options}"));
    }

    let mnemonic = mnemonic.to_ascii_uppercase();
    if !STATEMENTS.contains(&mnemonic.as_str()) {
        return Interpretation::NotControlStatement;
    }

    let fields = if operands.is_empty() {
        Vec::new()
    } else if matches!(mnemonic.as_str(), "LOG" | "MSG") {
        vec![operands.to_string()]
    } else {
        operands.split(',').map(|f| f.trim().to_string()).collect()
    };

    Interpretation::Parsed(ParsedStatement {
        label,
        mnemonic,
        options: options.to_ascii_uppercase(),
        fields,
        text: text.to_string(),
    })
}

/// Resolve use-names and qualify a file name as `QUALIFIER*FILENAME`.
fn qualify(run: &PinnedRun, name: &str) -> Result<String, String> {
    let name = run.resolve_name(name);
    let (qualifier, filename) = match name.split_once('*') {
        Some((q, f)) => (q.to_string(), f.to_string()),
        None => (run.project().to_ascii_uppercase(), name.clone()),
    };
    ident::validate_qualifier(&qualifier).map_err(|e| e.to_string())?;
    ident::validate_filename(&filename).map_err(|e| e.to_string())?;
    Ok(format!("{qualifier}*{filename}"))
}

fn field<'a>(statement: &'a ParsedStatement, index: usize) -> Option<&'a str> {
    statement
        .fields
        .get(index)
        .map(String::as_str)
        .filter(|f| !f.is_empty())
}

#[async_trait]
impl Interpreter for BasicInterpreter {
    fn interpret(&self, images: &[String]) -> Interpretation {
        if images.is_empty() {
            return Interpretation::NotControlStatement;
        }
        match join_images(images) {
            Some(text) => parse(&text),
            None => Interpretation::Continued,
        }
    }

    async fn execute(&self, statement: &ParsedStatement, ctx: &StatementContext) -> StatementOutcome {
        let run = &ctx.run;
        match statement.mnemonic.as_str() {
            "LOG" => {
                let text = field(statement, 0).unwrap_or_default();
                run.cell().record_console(ConsoleLogEntry::new(
                    ConsoleLogKind::ReadOnly,
                    None,
                    text,
                ));
                StatementOutcome::ok()
            }
            "MSG" => {
                let group = if statement.options.is_empty() {
                    MessageGroup::System
                } else {
                    match statement.options.parse::<MessageGroup>() {
                        Ok(g) => g,
                        Err(_) => {
                            return StatementOutcome::error(format!(
                                "UNKNOWN MESSAGE GROUP {}",
                                statement.options
                            ));
                        }
                    }
                };
                let Some(text) = field(statement, 0) else {
                    return StatementOutcome::error("MSG TEXT MISSING");
                };
                ctx.router.post_read_only(
                    Destination::group(group),
                    format!("{}: {}", run.name(), text),
                    run.owner(),
                );
                StatementOutcome::ok()
            }
            "ASG" => {
                let Some(name) = field(statement, 0) else {
                    return StatementOutcome::error("FILE NAME MISSING");
                };
                let full = match qualify(run, name) {
                    Ok(full) => full,
                    Err(e) => return StatementOutcome::error(format!("ILLEGAL FILE NAME: {e}")),
                };
                if run.facility_items().iter().any(|f| f.name == full) {
                    return StatementOutcome::ok().with_line(format!("{full} ALREADY ASSIGNED"));
                }
                match ctx.facilities.assign(run.name(), &full) {
                    Ok(item) => {
                        run.add_facility(item);
                        StatementOutcome::ok()
                    }
                    Err(e) if run.kind() == RunKind::Batch => {
                        StatementOutcome::abort(format!("FACILITY REJECTED: {e}"))
                    }
                    Err(e) => StatementOutcome::error(format!("FACILITY REJECTED: {e}")),
                }
            }
            "FREE" => {
                let Some(name) = field(statement, 0) else {
                    return StatementOutcome::error("FILE NAME MISSING");
                };
                let full = match qualify(run, name) {
                    Ok(full) => full,
                    Err(e) => return StatementOutcome::error(format!("ILLEGAL FILE NAME: {e}")),
                };
                let Some(item) = run.take_facility(&full) else {
                    return StatementOutcome::error(format!("{full} NOT ASSIGNED"));
                };
                match ctx.facilities.release(run.name(), &item) {
                    Ok(()) => StatementOutcome::ok(),
                    Err(e) => StatementOutcome::error(format!("FREE FAILED: {e}")),
                }
            }
            "USE" => {
                let (Some(alias), Some(target)) = (field(statement, 0), field(statement, 1)) else {
                    return StatementOutcome::error("USE NEEDS TWO NAMES");
                };
                if let Err(e) = ident::validate_filename(alias) {
                    return StatementOutcome::error(format!("ILLEGAL USE NAME: {e}"));
                }
                match qualify(run, target) {
                    Ok(full) => {
                        run.bind_use_name(alias, &full);
                        StatementOutcome::ok()
                    }
                    Err(e) => StatementOutcome::error(format!("ILLEGAL FILE NAME: {e}")),
                }
            }
            "JUMP" => match field(statement, 0) {
                Some(label) if is_word(label) && label.len() <= ident::MAX_IDENT_LEN => {
                    run.set_skip_label(Some(label.to_ascii_uppercase()));
                    StatementOutcome::ok()
                }
                _ => StatementOutcome::error("ILLEGAL JUMP LABEL"),
            },
            "SKIP" => match field(statement, 0).map(str::parse::<u32>) {
                Some(Ok(count)) => {
                    run.set_skip_count(count);
                    StatementOutcome::ok()
                }
                _ => StatementOutcome::error("ILLEGAL SKIP COUNT"),
            },
            "FIN" => {
                ctx.registry.finish_run(run);
                StatementOutcome::ok()
            }
            other => StatementOutcome::error(format!("{other} NOT IMPLEMENTED")),
        }
    }
}
