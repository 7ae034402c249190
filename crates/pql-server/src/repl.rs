//! Interactive REPL for PQL.
//!
//! Launch with `pql repl`. Statements and `:meta` commands run against the
//! local backend; `/help` lists REPL commands. Tab completes from the schema.

use std::sync::Arc;
use std::time::Instant;

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use pql::{CancelToken, ExecOutput, Executor, QueryPlan, Registry, Row};

use crate::config::{Backend, ServerConfig};
use crate::protocol::{meta, ProtocolHandler};
use crate::session::{AccessMode, Session};
use crate::types::ServerError;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/entities", "List queryable entities"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// Widest a table column gets before values are truncated.
const MAX_COLUMN_WIDTH: usize = 40;

/// REPL helper: slash commands plus schema-aware PQL completion.
struct PqlHelper {
    registry: Arc<Registry>,
}

fn word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .last()
        .map(|(i, _)| i)
        .unwrap_or(pos)
}

impl Completer for PqlHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if input.starts_with('/') && !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        let suggestions = pql::Completer::new(&self.registry).complete(line, pos);
        let matches = suggestions
            .into_iter()
            .map(|s| Pair {
                display: match &s.detail {
                    Some(detail) => format!("{:<24} {detail}", s.label),
                    None => s.label.clone(),
                },
                replacement: s.insert_text.unwrap_or(s.label),
            })
            .collect();
        Ok((word_start(line, pos), matches))
    }
}

impl Hinter for PqlHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
            return None;
        }

        // Hint only when exactly one candidate extends the word being typed.
        let start = word_start(line, pos);
        let typed = &line[start..pos];
        if typed.is_empty() {
            return None;
        }
        let mut candidates = pql::Completer::new(&self.registry)
            .complete(line, pos)
            .into_iter()
            .map(|s| s.insert_text.unwrap_or(s.label))
            .filter(|c| c.len() > typed.len() && c.starts_with(typed));
        match (candidates.next(), candidates.next()) {
            (Some(only), None) => Some(only[typed.len()..].to_string()),
            _ => None,
        }
    }
}

impl Highlighter for PqlHelper {}
impl Validator for PqlHelper {}
impl Helper for PqlHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Run the interactive REPL.
pub fn run(backend: Backend, config: ServerConfig) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mpql v{}\x1b[0m \x1b[90m\u{2014} {} entities from {}\x1b[0m",
        env!("CARGO_PKG_VERSION"),
        backend.registry.len(),
        backend.source,
    );
    eprintln!();
    eprintln!(
        "    Type a statement or \x1b[36m:help\x1b[0m, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(40)
        .build();

    let mut rl: Editor<PqlHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(rl_config)?;
    rl.set_helper(Some(PqlHelper {
        registry: backend.registry.clone(),
    }));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".pql_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let mode = config.effective_mode(AccessMode::ReadWrite);
    let handler = ProtocolHandler::new(backend, config);
    let mut session = Session::new(mode);
    let prompt = " \x1b[36mpql>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if let Some(cmd) = line.strip_prefix('/') {
                    match cmd.split_whitespace().next().unwrap_or("") {
                        "exit" | "quit" => {
                            eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                            break;
                        }
                        "help" | "h" | "?" | "" => cmd_help(),
                        "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                        "entities" => cmd_entities(handler.registry()),
                        other => {
                            eprintln!("  Unknown command '/{other}'. Type /help for commands.");
                        }
                    }
                    continue;
                }

                match evaluate(&handler, &mut session, line) {
                    Ok(output) => println!("{output}"),
                    Err(e) => eprintln!("  \x1b[31m{}\x1b[0m: {e}", e.code()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

/// Compile and run one statement, rendering the result as a table.
fn evaluate(handler: &ProtocolHandler, session: &mut Session, pql: &str) -> Result<String, ServerError> {
    let started = Instant::now();
    let plan = handler.compile(pql)?;

    if plan.is_mutation() && !session.mode.allows_mutation() {
        return Err(ServerError::ReadOnly(plan.kind().to_string()));
    }

    if let QueryPlan::Meta(command) = &plan {
        let out = meta::run(command, handler.registry(), session)?;
        return Ok(render_table(&out.fields, &out.rows));
    }

    session.record(pql);
    let output = Executor::new(&handler.backend().dispatch).execute(&plan, &CancelToken::new())?;
    let elapsed = started.elapsed().as_millis();

    let rendered = match output {
        ExecOutput::Count { entity, count } => format!("{count} {entity}"),
        other => {
            let fields = plan.fields().map(<[String]>::to_vec).unwrap_or_default();
            let rows = other.into_rows();
            let n = rows.len();
            format!(
                "{}\n  \x1b[90m{n} row{} in {elapsed} ms\x1b[0m",
                render_table(&fields, &rows),
                if n == 1 { "" } else { "s" }
            )
        }
    };
    Ok(rendered)
}

fn cell(value: Option<&serde_json::Value>) -> String {
    let text = match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if text.chars().count() > MAX_COLUMN_WIDTH {
        let cut: String = text.chars().take(MAX_COLUMN_WIDTH - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        text
    }
}

/// Plain-text table. Columns follow `fields`, or the first row's keys when empty.
pub fn render_table(fields: &[String], rows: &[Row]) -> String {
    let columns: Vec<String> = if fields.is_empty() {
        rows.first()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    } else {
        let mut columns = fields.to_vec();
        // Eager-loaded edges ride along as extra columns.
        if let Some(first) = rows.first() {
            columns.extend(first.keys().filter(|k| !fields.contains(k)).cloned());
        }
        columns
    };
    if columns.is_empty() {
        return "  (no rows)".to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| columns.iter().map(|c| cell(r.get(c))).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| {
        let padded: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{v:<width$}", width = *w))
            .collect();
        format!("  {}", padded.join("  ").trim_end())
    };

    let mut out = vec![line(&columns)];
    out.push(line(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>()));
    out.extend(cells.iter().map(|row| line(row)));
    out.join("\n")
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Anything else is run as PQL. Try ':help' or 'find lease limit 5'.");
    eprintln!();
}

fn cmd_entities(registry: &Registry) {
    eprintln!();
    for entity in registry.entities() {
        let flag = if entity.immutable { " (immutable)" } else { "" };
        eprintln!(
            "    {:<20} {} fields, {} edges{flag}",
            entity.name,
            entity.fields.len(),
            entity.edges.len()
        );
    }
    eprintln!();
}
