use bytes::Bytes;
use clap::Parser;
use fs_err as fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

mod archive;
mod cli;
mod client;
mod config;
mod errors;
mod log;
mod project;
mod prompt;
mod provider;
mod session;
mod ux;
mod wire;

#[cfg(test)]
mod test_utils;

use cli::Command;
use config::Config;
use errors::{ForgeError, Operation};
use project::Attachment;
use session::{AttachmentSlot, Session, View};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    log::init_tracing(args.debug);

    let cfg = Config::from_args(&args)?;
    let prov = provider::make_provider(&cfg)?;
    let mut backend = client::BackendClient::new(prov, &cfg);
    if cfg.save_exchanges {
        let exchanges = log::ExchangeLog::new(&cfg.artifacts_dir);
        tracing::info!(dir = %exchanges.root().display(), "saving request/response pairs");
        backend = backend.with_exchange_log(exchanges);
    }
    let session = Session::new(backend);

    ux::print_welcome(&cfg);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        ux::prompt(&session.snapshot());
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let cmd = match cli::parse_command(&line) {
            Ok(c) => c,
            Err(msg) => {
                ux::print_hint(&msg);
                continue;
            }
        };
        if cmd == Command::Quit {
            break;
        }
        if let Err(e) = run(&session, &cfg, cmd).await {
            ux::print_error(&e);
        }
    }
    Ok(())
}

async fn run(session: &Session, cfg: &Config, cmd: Command) -> Result<(), ForgeError> {
    match cmd {
        Command::New(idea) => {
            let pb = ux::spinner(Operation::Generate);
            let res = session.create_from_prompt(&idea).await;
            pb.finish_and_clear();
            res?;
            ux::print_view(&session.snapshot());
        }
        Command::Import(path) => {
            let data = fs::read(&path)?;
            let upload_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            let pb = ux::spinner(Operation::Import);
            let res = session.import_archive(Bytes::from(data), upload_name).await;
            pb.finish_and_clear();
            res?;
            ux::print_view(&session.snapshot());
        }
        Command::Image(path) => attach(session, AttachmentSlot::Idea, &path)?,
        Command::RefineImage(path) => attach(session, AttachmentSlot::Refine, &path)?,
        Command::ClearImage => {
            session.clear_attachment(AttachmentSlot::Idea);
            session.clear_attachment(AttachmentSlot::Refine);
        }
        Command::Files => {
            session.set_view(View::Files);
            ux::print_project(&session.snapshot());
        }
        Command::Open(path) => {
            session.select_file(&path)?;
            session.set_view(View::Files);
            ux::print_view(&session.snapshot());
        }
        Command::Show => match session.selected_file() {
            Some(f) => ux::print_file(&f),
            None => ux::print_hint("no file selected"),
        },
        Command::Refine(instruction) => {
            let pb = ux::spinner(Operation::Refine);
            let res = session.refine(&instruction).await;
            pb.finish_and_clear();
            res?;
            ux::print_view(&session.snapshot());
        }
        Command::Ask(question) => {
            let pb = ux::spinner(Operation::Chat);
            let res = session.ask(&question).await;
            pb.finish_and_clear();
            ux::print_message(&res?);
        }
        Command::Chat => {
            session.set_view(View::Chat);
            ux::print_transcript(&session.snapshot());
        }
        Command::Export(dir) => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&cfg.export_dir));
            let pb = ux::spinner(Operation::Export);
            let res = session.export_to(&dir).await;
            pb.finish_and_clear();
            println!("saved {}", res?.display());
        }
        Command::Dismiss => session.dismiss_error(),
        Command::Help => ux::print_help(),
        Command::Quit => {}
    }
    Ok(())
}

fn attach(session: &Session, slot: AttachmentSlot, path: &Path) -> Result<(), ForgeError> {
    let attachment = Attachment::from_path(path)?;
    println!("attached {} ({})", attachment.preview, attachment.mime_type);
    session.attach(slot, attachment);
    Ok(())
}
