//! Parsing of interactive terminal commands.

use std::path::PathBuf;

use shared::domain::{AttachmentKind, CurrencyField, SrdId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Rows,
    Edit {
        srd_id: SrdId,
        field: CurrencyField,
        raw: String,
    },
    Note {
        srd_id: SrdId,
        text: String,
    },
    Upload {
        srd_id: SrdId,
        kind: AttachmentKind,
        paths: Vec<PathBuf>,
    },
    Reload(PathBuf),
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  rows                                  show every row
  edit <srd> <as-is|arv|rehab> <text>   type into a currency field
  note <srd> <text>                     replace the row's note
  upload <srd> <photo|document> <path>...
  reload <rows.json>                    re-read the row list
  quit";

fn parse_srd(raw: Option<&str>) -> Result<SrdId, String> {
    let raw = raw.ok_or("missing row id")?;
    raw.parse::<i64>()
        .map(SrdId)
        .map_err(|_| format!("invalid row id '{raw}'"))
}

/// Rest of the line after skipping `skip` whitespace-separated words.
fn rest_after(line: &str, skip: usize) -> String {
    let mut rest = line.trim_start();
    for _ in 0..skip {
        rest = rest
            .split_once(char::is_whitespace)
            .map(|(_, tail)| tail.trim_start())
            .unwrap_or("");
    }
    rest.to_string()
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };

    match verb {
        "rows" | "ls" => Ok(Command::Rows),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "edit" => {
            let srd_id = parse_srd(words.next())?;
            let label = words.next().ok_or("missing field name")?;
            let field = CurrencyField::from_label(label)
                .ok_or_else(|| format!("unknown field '{label}'"))?;
            Ok(Command::Edit {
                srd_id,
                field,
                raw: rest_after(line, 3),
            })
        }
        "note" => {
            let srd_id = parse_srd(words.next())?;
            Ok(Command::Note {
                srd_id,
                text: rest_after(line, 2),
            })
        }
        "upload" => {
            let srd_id = parse_srd(words.next())?;
            let kind = match words.next() {
                Some("photo") | Some("photos") => AttachmentKind::Photo,
                Some("document") | Some("documents") | Some("doc") => AttachmentKind::Document,
                Some(other) => return Err(format!("unknown attachment kind '{other}'")),
                None => return Err("missing attachment kind".to_string()),
            };
            let paths: Vec<PathBuf> = words.map(PathBuf::from).collect();
            if paths.is_empty() {
                return Err("no files given".to_string());
            }
            Ok(Command::Upload {
                srd_id,
                kind,
                paths,
            })
        }
        "reload" => {
            let path = words.next().ok_or("missing rows file")?;
            Ok(Command::Reload(PathBuf::from(path)))
        }
        other => Err(format!("unknown command '{other}' (try 'help')")),
    }
}
