use std::io::{IsTerminal, Write};

use folio_stream::session::Update;

/// Writes streamed deltas to `stdout`, with a spinner on terminals until the first one lands.
pub struct Printer {
    spinner: Option<spinners::Spinner>,
    is_terminal: bool,
    quiet: bool,
    printed: bool,
}

impl Printer {
    pub fn new(quiet: bool) -> Self {
        Self {
            spinner: None,
            is_terminal: std::io::stdout().is_terminal(),
            quiet,
            printed: false,
        }
    }

    fn start(&mut self) {
        self.printed = false;

        if self.is_terminal && !self.quiet {
            self.spinner = Some(spinners::Spinner::new(
                spinners::Spinners::OrangeBluePulse,
                "Thinking...".into(),
            ));
        }
    }

    fn stop_spinner(&mut self) -> std::io::Result<()> {
        if let Some(mut spinner) = self.spinner.take() {
            spinner.stop();
            crossterm::execute!(
                std::io::stdout(),
                crossterm::terminal::Clear(crossterm::terminal::ClearType::CurrentLine),
                crossterm::cursor::MoveToColumn(0)
            )?;
        }

        Ok(())
    }

    pub fn handle(&mut self, update: Update<'_>) -> std::io::Result<()> {
        match update {
            Update::User(_) => self.start(),
            Update::Delta { delta, .. } => {
                self.stop_spinner()?;
                print!("{delta}");
                std::io::stdout().flush()?;
                self.printed = true;
            }
            Update::Error(_) => self.stop_spinner()?,
        }

        Ok(())
    }

    /// Ends the current reply: clears a spinner that never got a delta and closes the line.
    pub fn finish(&mut self) -> std::io::Result<()> {
        self.stop_spinner()?;

        if self.printed {
            println!();
        }

        Ok(())
    }
}
