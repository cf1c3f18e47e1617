// Operator console
//
// The run controller talks to the operator only through the Console trait so
// the approval workflow can be driven by scripted answers in tests.

use std::io::{self, BufRead, Write};

/// Text console used for prompts, plan display and summaries
pub trait Console {
    /// Print a line of output.
    fn say(&mut self, text: &str);

    /// Print `question` and read one line of input.
    ///
    /// End of input yields an empty string, which every prompt treats as a No.
    fn ask(&mut self, question: &str) -> io::Result<String>;
}

/// Console over stdin/stdout
#[derive(Debug, Default)]
pub struct StdConsole;

impl StdConsole {
    pub fn new() -> Self {
        Self
    }
}

impl Console for StdConsole {
    fn say(&mut self, text: &str) {
        println!("{}", text);
    }

    fn ask(&mut self, question: &str) -> io::Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", question)?;
        stdout.flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        Ok(input)
    }
}

/// Ask a yes/no question; only an explicit yes counts.
pub fn confirm<C: Console + ?Sized>(console: &mut C, question: &str) -> io::Result<bool> {
    let answer = console.ask(&format!("{} [y/N]: ", question))?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}
