use std::io::{IsTerminal, Read};

pub use crate::args::Args;
pub use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Reads piped `stdin` into `args.stdin`. Nothing is read from a terminal.
pub fn read_stdin(mut args: Args) -> Result<Args> {
    let stdin = std::io::stdin();

    if !stdin.is_terminal() {
        let mut input = String::new();
        stdin.lock().read_to_string(&mut input)?;
        args.stdin = Some(input);
    }

    Ok(args)
}

/// The single turn to send, if the invocation is one-shot.
///
/// 1. `folio-chat "Something"` sends `Something`.
/// 2. `echo Something | folio-chat` sends `Something`.
/// 3. `echo Awesome | folio-chat "Something"` sends `Awesome\nSomething`.
/// 4. `folio-chat` with nothing piped starts an interactive session.
pub fn one_shot_prompt(args: &Args) -> Option<String> {
    let stdin = args
        .stdin
        .as_deref()
        .map(str::trim)
        .filter(|stdin| !stdin.is_empty());
    let prompt = args
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty());

    match (stdin, prompt) {
        (Some(stdin), Some(prompt)) => Some(format!("{stdin}\n{prompt}")),
        (Some(text), None) | (None, Some(text)) => Some(text.to_string()),
        (None, None) => None,
    }
}
