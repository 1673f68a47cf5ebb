mod args;
mod error;
mod prelude;
mod printer;

use std::io::Write;

use clap::Parser;
use folio_stream::client::Client;
use folio_stream::session::ChatSession;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::prelude::*;
use crate::printer::Printer;

/// Sends one turn and prints the reply as it streams in.
async fn turn(session: &mut ChatSession, printer: &mut Printer, content: &str) -> Result<()> {
    let mut io_error = None;

    let result = session
        .send(content, |update| {
            if let Err(e) = printer.handle(update) {
                io_error.get_or_insert(e);
            }
        })
        .await;

    printer.finish()?;

    if let Some(e) = io_error {
        return Err(e.into());
    }

    Ok(result?)
}

/// Reads one user turn per line from `input` until EOF or `/exit`.
async fn interactive<R>(mut input: R, session: &mut ChatSession, printer: &mut Printer) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line).await? == 0 {
            println!();
            return Ok(());
        }

        match line.trim() {
            "" => continue,
            "/exit" | "/quit" => return Ok(()),
            "/history" => {
                println!("{}", serde_json::to_string_pretty(&session.conversation())?);
                continue;
            }
            _ => {}
        }

        // A failed turn is shown and the session goes on.
        if let Err(e) = turn(session, printer, &line).await {
            eprintln!("error: {e}");
        }
    }
}

async fn run(args: Args) -> Result<()> {
    log::debug!("relay url: {}", args.url);

    let client = Client::new(args.url.clone()).with_token(args.token.clone());
    let mut session = ChatSession::new(client).with_history(args.conversation.clone());
    let mut printer = Printer::new(args.quiet);

    match one_shot_prompt(&args) {
        Some(prompt) => turn(&mut session, &mut printer, &prompt).await,
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            interactive(stdin, &mut session, &mut printer).await
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let result = match read_stdin(Args::parse()) {
        Ok(args) => run(args).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
