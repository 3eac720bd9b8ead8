use std::io::{self, BufRead, Write};

use crate::catalog::{Catalog, CatalogEntry};
use crate::domain::DecompressChoice;
use crate::error::JgiError;
use crate::output::SYNTAX_HELP;
use crate::selection;

/// Line-based dialogs over any reader/writer pair.
///
/// End of input counts as the user quitting.
pub struct Prompter<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    pub fn say(&mut self, text: &str) -> Result<(), JgiError> {
        writeln!(self.output, "{text}").map_err(terminal)
    }

    /// Prints `prompt` and returns the trimmed answer.
    pub fn ask(&mut self, prompt: &str) -> Result<String, JgiError> {
        write!(self.output, "{prompt}").map_err(terminal)?;
        self.output.flush().map_err(terminal)?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(terminal)?;
        if read == 0 {
            return Err(JgiError::Aborted);
        }
        Ok(line.trim().to_string())
    }

    pub fn confirm(&mut self, prompt: &str) -> Result<bool, JgiError> {
        let answer = self.ask(prompt)?.to_lowercase();
        Ok(matches!(answer.as_str(), "y" | "yes"))
    }

    /// Asks for portal credentials until the user confirms them.
    pub fn credentials(&mut self) -> Result<(String, String), JgiError> {
        self.say(
            "JGI portal credentials are needed to sign in. \
             They are stored in the config file for later runs ('q' to quit).",
        )?;
        loop {
            let user = self.ask("JGI account username/email: ")?;
            if user.eq_ignore_ascii_case("q") {
                return Err(JgiError::Aborted);
            }
            let password = self.ask("JGI account password: ")?;
            if password.eq_ignore_ascii_case("q") {
                return Err(JgiError::Aborted);
            }
            self.say(&format!("*** USERNAME: {user}\n*** PASSWORD: {password}"))?;
            loop {
                let answer = self
                    .ask("Is this information correct? [y]es, [n]o (quit), [r]estart: ")?
                    .to_lowercase();
                match answer.as_str() {
                    "y" | "yes" => return Ok((user, password)),
                    "n" | "no" => return Err(JgiError::Aborted),
                    "r" | "restart" => break,
                    _ => self.say("Please answer y, n or r.")?,
                }
            }
        }
    }

    /// Reads selections until one parses and resolves against `catalog`.
    ///
    /// `usage` prints the syntax help; `q`, `quit` and `exit` abort.
    pub fn select<'c>(
        &mut self,
        catalog: &'c Catalog,
    ) -> Result<Vec<&'c CatalogEntry>, JgiError> {
        loop {
            let choice = self.ask("Enter file selection ('q' to quit, 'usage' to review syntax):\n>")?;
            match choice.to_lowercase().as_str() {
                "usage" => {
                    self.say(SYNTAX_HELP)?;
                    continue;
                }
                "q" | "quit" | "exit" => return Err(JgiError::Aborted),
                _ => {}
            }
            let resolved = selection::parse(&choice).and_then(|set| catalog.resolve(&set));
            match resolved {
                Ok(entries) if !entries.is_empty() => return Ok(entries),
                Ok(_) => self.say("Nothing selected.")?,
                Err(err) => self.say(&format!("{err}"))?,
            }
        }
    }

    pub fn decompress_choice(&mut self) -> Result<DecompressChoice, JgiError> {
        let answer = self.ask(
            "Decompress all downloaded files? (y/n/k=keep compressed originals as well): ",
        )?;
        Ok(DecompressChoice::from_answer(&answer))
    }
}

fn terminal(err: io::Error) -> JgiError {
    JgiError::Terminal(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;
    use crate::catalog::CategoryMode;
    use crate::manifest::ManifestNode;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn catalog() -> Catalog {
        let root = ManifestNode::container(
            "Org",
            vec![ManifestNode::container(
                "Genes",
                vec![
                    ManifestNode::file([("filename", "a.gff"), ("url", "/a")]),
                    ManifestNode::file([("filename", "b.gff"), ("url", "/b")]),
                ],
            )],
        );
        Catalog::extract(&root, &CategoryMode::All)
    }

    #[test]
    fn eof_aborts() {
        assert_matches!(prompter("").ask("? "), Err(JgiError::Aborted));
    }

    #[test]
    fn credentials_restart_then_confirm() {
        let mut prompter = prompter("me\nbad\nr\nme\ngood\ny\n");
        let (user, password) = prompter.credentials().unwrap();
        assert_eq!((user.as_str(), password.as_str()), ("me", "good"));
    }

    #[test]
    fn credentials_quit() {
        assert_matches!(prompter("q\n").credentials(), Err(JgiError::Aborted));
        assert_matches!(prompter("me\npw\nn\n").credentials(), Err(JgiError::Aborted));
    }

    #[test]
    fn selection_reprompts_after_errors() {
        let catalog = catalog();
        let mut prompter = prompter("usage\n1:abc\n9:1\n1:2\n");
        let entries = prompter.select(&catalog).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "b.gff");

        let transcript = String::from_utf8(prompter.into_output()).unwrap();
        assert!(transcript.contains("# SYNTAX"));
        assert!(transcript.contains("?-->'abc'"));
        assert!(transcript.contains("category 9 not found"));
    }

    #[test]
    fn selection_quit_words() {
        let catalog = catalog();
        for word in ["q", "quit", "EXIT"] {
            assert_matches!(prompter(&format!("{word}\n")).select(&catalog), Err(JgiError::Aborted));
        }
    }

    #[test]
    fn decompress_answers() {
        assert_eq!(prompter("k\n").decompress_choice().unwrap(), DecompressChoice::Keep);
        assert_eq!(prompter("n\n").decompress_choice().unwrap(), DecompressChoice::No);
        assert_eq!(prompter("\n").decompress_choice().unwrap(), DecompressChoice::Yes);
    }
}
