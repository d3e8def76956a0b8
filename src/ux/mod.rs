use colored::Colorize;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

use crate::config::Config;
use crate::errors::{ForgeError, NoticeKind, Operation};
use crate::project::{ChatMessage, ExtensionFile, Role};
use crate::session::{Notice, SessionState, View};

const HELP: &str = r#"Commands:
  /new <idea>            generate a new extension from a description
  /image <path>          attach a screenshot/mockup to the next /new
  /import <file.zip>     load an existing extension from a ZIP archive
  /files                 list project files
  /open <path>           select a file and show it
  /show                  show the selected file again
  /refine <instruction>  change the project (full file set is rewritten)
  /refine-image <path>   attach an image to the next /refine
  /clear-image           drop pending images
  /ask <question>        ask about the project (plain text works too)
  /chat                  show the conversation
  /export [dir]          save the project as a ZIP archive
  /dismiss               clear the last error
  /quit                  leave (nothing is saved)"#;

pub fn print_welcome(cfg: &Config) {
    println!("{}", "Addon Forge".bold());
    println!(
        "provider: {:?}  build model: {}  chat model: {}",
        cfg.provider,
        cfg.build_model(),
        cfg.chat_model()
    );
    println!("Type /help for commands.\n");
}

pub fn print_help() {
    println!("{HELP}");
}

pub fn prompt(state: &SessionState) {
    let mut tags = Vec::new();
    if state.idea_image.is_some() || state.refine_image.is_some() {
        tags.push("img".to_string());
    }
    if state.unread_chat {
        tags.push("new chat".to_string());
    }
    if state.last_error.is_some() {
        tags.push("error, /dismiss".to_string());
    }
    let label = match &state.project {
        Some(p) => p.name.clone(),
        None => "no project".to_string(),
    };
    let tags = if tags.is_empty() { String::new() } else { format!(" [{}]", tags.join(", ")) };
    print!("{}{}> ", label.cyan(), tags.yellow());
    io::stdout().flush().ok();
}

pub fn spinner(op: Operation) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    let msg = match op {
        Operation::Generate => "generating extension",
        Operation::Import => "reading archive",
        Operation::Refine => "applying changes",
        Operation::Chat => "thinking",
        Operation::Export => "packing archive",
    };
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn print_project(state: &SessionState) {
    let Some(project) = &state.project else {
        println!("(no project yet; use /new or /import)");
        return;
    };
    println!("\n{}  {}", project.name.bold(), project.description.dimmed());
    println!(
        "{} files, created {}",
        project.files.len(),
        project.created_at.format("%Y-%m-%d %H:%M")
    );
    for f in &project.files {
        let marker = if state.selected.as_deref() == Some(f.path.as_str()) { "▶" } else { " " };
        println!(
            "{} {:<40} {:<10} {}",
            marker,
            f.path,
            language_badge(&f.language),
            format_size(f.content.len(), DECIMAL).dimmed()
        );
    }
    println!();
}

fn language_badge(lang: &str) -> colored::ColoredString {
    match lang {
        "json" => lang.blue(),
        "html" => lang.red(),
        "css" => lang.magenta(),
        _ => lang.yellow(),
    }
}

pub fn print_file(file: &ExtensionFile) {
    println!("\n{} {}", format!("[{}]", file.language.to_uppercase()).bold(), file.path.bold());
    println!("{}", "─".repeat(60).dimmed());
    println!("{}", file.content);
    println!("{}\n", "─".repeat(60).dimmed());
}

pub fn print_message(msg: &ChatMessage) {
    match msg.role {
        Role::User => println!("{} {}", "you:".green().bold(), msg.text),
        Role::Assistant => {
            println!("{}\n{}", "ai:".cyan().bold(), msg.text);
            if let Some(sources) = &msg.sources {
                println!("{}", "sources:".dimmed());
                for s in sources {
                    println!("  - {} <{}>", s.title, s.uri.underline());
                }
            }
        }
    }
    println!();
}

pub fn print_transcript(state: &SessionState) {
    if state.transcript.is_empty() {
        println!("(no conversation yet)");
        return;
    }
    for m in &state.transcript {
        print_message(m);
    }
}

pub fn print_view(state: &SessionState) {
    match state.view {
        View::Files => {
            print_project(state);
            if let Some(f) = state.selected_file() {
                print_file(f);
            }
        }
        View::Chat => {
            if let Some(last) = state.transcript.last() {
                print_message(last);
            }
        }
    }
}

pub fn print_notice(notice: &Notice) {
    let label = match notice.kind {
        NoticeKind::Backend => "AI error",
        NoticeKind::Archive => "archive error",
        NoticeKind::Local => "local error",
        NoticeKind::Input => "note",
    };
    eprintln!("{} {}", format!("{label}:").red().bold(), notice.message);
}

pub fn print_error(err: &ForgeError) {
    print_notice(&Notice { kind: err.notice_kind(), message: err.to_string() });
}

pub fn print_hint(msg: &str) {
    println!("{}", msg.yellow());
}
