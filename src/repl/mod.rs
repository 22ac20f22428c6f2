//! Interactive read-eval-print loop
//!
//! Each cycle reads one logical statement. The first line is tried as an
//! expression (`return <line>;`) so bare values print; if that does not compile,
//! the text is compiled as a statement, pulling in more lines for as long as
//! the compiler reports that the input ended too early.

pub mod input;

use crossterm::tty::IsTty;
use mlua::Function;
use tracing::{debug, trace};

use crate::config::Settings;
use crate::driver::Driver;
use crate::driver::status::{Failure, Status, status_of};
use crate::runtime::Compiled;
use input::{EditorSource, Input, LineSource, StreamSource};

/// Chunk name for everything typed at the prompt
pub const REPL_CHUNK: &str = "=stdin";

/// Outcome of one read-eval-print cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Done(Status),
    Closed,
}

/// How reading a logical statement ended
enum Statement {
    Ready(Function),
    Failed(Failure),
    Cancelled,
    Closed,
}

pub struct Repl<'d, S> {
    driver: &'d Driver,
    source: S,
    closed: bool,
}

impl<'d, S: LineSource> Repl<'d, S> {
    pub fn new(driver: &'d Driver, source: S) -> Self {
        Self {
            driver,
            source,
            closed: false,
        }
    }

    /// Loop until the input source runs dry
    pub fn run(&mut self) -> anyhow::Result<()> {
        let _quiet = self.driver.without_progname();
        while let Step::Done(status) = self.step()? {
            trace!(?status, "statement finished");
        }
        println!();
        Ok(())
    }

    /// Read, run and print one logical statement
    pub fn step(&mut self) -> anyhow::Result<Step> {
        if self.closed {
            return Ok(Step::Closed);
        }

        let chunk = match self.read_statement()? {
            Statement::Ready(chunk) => chunk,
            Statement::Failed(failure) => {
                self.driver.message(&failure.message);
                return Ok(Step::Done(failure.status));
            }
            Statement::Cancelled => return Ok(Step::Done(Status::Interrupted)),
            Statement::Closed => return Ok(Step::Closed),
        };

        let result = self.driver.guarded_call(chunk, ()).and_then(|values| {
            if values.is_empty() {
                Ok(())
            } else {
                self.driver.runtime().print(values)
            }
        });
        Ok(Step::Done(status_of(&self.driver.report(result))))
    }

    fn read_statement(&mut self) -> anyhow::Result<Statement> {
        let prompt = self.driver.runtime().prompt(true);
        let mut line = match self.source.read_line(&prompt, false)? {
            Input::Line(line) => line,
            Input::Cancelled => return Ok(Statement::Cancelled),
            Input::Closed => return Ok(Statement::Closed),
        };
        // Old-style '=expr'
        if let Some(rest) = line.strip_prefix('=') {
            line = format!("return {rest}");
        }

        if let Compiled::Ready(chunk) = self.compile(&format!("return {line};")) {
            self.finalize(&line);
            return Ok(Statement::Ready(chunk));
        }

        loop {
            match self.compile(&line) {
                Compiled::Ready(chunk) => {
                    self.finalize(&line);
                    return Ok(Statement::Ready(chunk));
                }
                Compiled::Invalid(failure) => {
                    self.finalize(&line);
                    return Ok(Statement::Failed(failure));
                }
                Compiled::Incomplete(failure) => {
                    let prompt = self.driver.runtime().prompt(false);
                    match self.source.read_line(&prompt, true)? {
                        Input::Line(next) => {
                            line.push('\n');
                            line.push_str(&next);
                        }
                        Input::Cancelled => return Ok(Statement::Cancelled),
                        Input::Closed => {
                            self.closed = true;
                            return Ok(Statement::Failed(failure));
                        }
                    }
                }
            }
        }
    }

    fn compile(&self, source: &str) -> Compiled {
        self.driver.runtime().compile(source.as_bytes(), REPL_CHUNK)
    }

    fn finalize(&mut self, statement: &str) {
        debug!(lines = statement.lines().count(), "statement finalized");
        if !statement.is_empty() {
            self.source.save_line(statement);
        }
    }
}

/// Run the REPL on standard input, with line editing when it is a terminal
pub fn run(driver: &Driver, settings: &Settings) -> anyhow::Result<()> {
    if std::io::stdin().is_tty() {
        Repl::new(driver, EditorSource::new(settings)?).run()
    } else {
        Repl::new(driver, StreamSource::stdio()).run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::LuaRuntime;
    use mlua::MultiValue;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Replays canned input and remembers what the REPL asked for
    #[derive(Default)]
    struct Script {
        inputs: VecDeque<Input>,
        prompts: Vec<(String, bool)>,
        saved: Vec<String>,
    }

    impl Script {
        fn lines(lines: &[&str]) -> Self {
            Self {
                inputs: lines.iter().map(|l| Input::Line(l.to_string())).collect(),
                ..Self::default()
            }
        }
    }

    impl LineSource for Script {
        fn read_line(&mut self, prompt: &str, continuation: bool) -> anyhow::Result<Input> {
            self.prompts.push((prompt.to_string(), continuation));
            Ok(self.inputs.pop_front().unwrap_or(Input::Closed))
        }

        fn save_line(&mut self, statement: &str) {
            self.saved.push(statement.to_string());
        }
    }

    /// Driver whose `print` writes into the returned buffer
    fn capturing_driver() -> (Driver, Rc<RefCell<Vec<String>>>) {
        let driver = Driver::new(LuaRuntime::new(false).unwrap(), "lua").unwrap();
        let printed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&printed);
        let print = driver
            .runtime()
            .lua()
            .create_function(move |lua, values: MultiValue| {
                let tostring: Function = lua.globals().get("tostring")?;
                let parts = values
                    .into_iter()
                    .map(|value| tostring.call::<String>(value))
                    .collect::<mlua::Result<Vec<_>>>()?;
                sink.borrow_mut().push(parts.join("\t"));
                Ok(())
            })
            .unwrap();
        driver.runtime().set_global("print", print).unwrap();
        (driver, printed)
    }

    #[test]
    fn expression_is_printed() {
        let (driver, printed) = capturing_driver();
        let mut repl = Repl::new(&driver, Script::lines(&["1+1"]));
        assert_eq!(repl.step().unwrap(), Step::Done(Status::Ok));
        assert_eq!(*printed.borrow(), vec!["2"]);
        assert_eq!(repl.source.saved, vec!["1+1"]);
        assert_eq!(repl.step().unwrap(), Step::Closed);
    }

    #[test]
    fn incomplete_statement_reads_a_continuation() {
        let (driver, printed) = capturing_driver();
        let mut repl = Repl::new(&driver, Script::lines(&["if true then", "end"]));
        assert_eq!(repl.step().unwrap(), Step::Done(Status::Ok));
        assert!(printed.borrow().is_empty());
        assert_eq!(repl.source.saved, vec!["if true then\nend"]);
        assert_eq!(
            repl.source.prompts,
            vec![("> ".to_string(), false), (">> ".to_string(), true)]
        );
    }

    #[test]
    fn multi_line_statement_runs_once_joined() {
        let (driver, printed) = capturing_driver();
        let mut repl = Repl::new(&driver, Script::lines(&["t = {", "1, 2,", "3 }", "print(#t)"]));
        assert_eq!(repl.step().unwrap(), Step::Done(Status::Ok));
        assert_eq!(repl.step().unwrap(), Step::Done(Status::Ok));
        assert_eq!(*printed.borrow(), vec!["3"]);
        assert_eq!(repl.source.saved, vec!["t = {\n1, 2,\n3 }", "print(#t)"]);
    }

    #[test]
    fn hard_syntax_error_is_recorded_and_reported() {
        let (driver, _) = capturing_driver();
        let mut repl = Repl::new(&driver, Script::lines(&["x = = 1", "y = 2"]));
        assert_eq!(repl.step().unwrap(), Step::Done(Status::SyntaxError));
        assert_eq!(repl.source.saved, vec!["x = = 1"]);

        // The buffer starts clean on the next cycle
        assert_eq!(repl.step().unwrap(), Step::Done(Status::Ok));
        assert_eq!(driver.runtime().global::<i64>("y").unwrap(), 2);
    }

    #[test]
    fn end_of_input_mid_statement_ends_the_session() {
        let (driver, _) = capturing_driver();
        let mut repl = Repl::new(&driver, Script::lines(&["function f()"]));
        assert_eq!(repl.step().unwrap(), Step::Done(Status::SyntaxIncomplete));
        assert!(repl.source.saved.is_empty());
        assert_eq!(repl.step().unwrap(), Step::Closed);
    }

    #[test]
    fn equals_shorthand_returns_the_value() {
        let (driver, printed) = capturing_driver();
        let mut repl = Repl::new(&driver, Script::lines(&["=1+2", "= 'a', 'b'"]));
        repl.step().unwrap();
        repl.step().unwrap();
        assert_eq!(*printed.borrow(), vec!["3", "a\tb"]);
        assert_eq!(repl.source.saved, vec!["return 1+2", "return  'a', 'b'"]);
    }

    #[test]
    fn runtime_error_does_not_end_the_session() {
        let (driver, printed) = capturing_driver();
        let mut repl = Repl::new(&driver, Script::lines(&["error('boom')", "40 + 2"]));
        assert_eq!(repl.step().unwrap(), Step::Done(Status::RuntimeError));
        assert_eq!(repl.step().unwrap(), Step::Done(Status::Ok));
        assert_eq!(*printed.borrow(), vec!["42"]);
    }

    #[test]
    fn prompt_globals_are_honored() {
        let (driver, _) = capturing_driver();
        driver.runtime().set_global("_PROMPT", "lua% ").unwrap();
        driver.runtime().set_global("_PROMPT2", "...> ").unwrap();
        let mut repl = Repl::new(&driver, Script::lines(&["do", "end"]));
        repl.step().unwrap();
        assert_eq!(
            repl.source.prompts,
            vec![("lua% ".to_string(), false), ("...> ".to_string(), true)]
        );
    }

    #[test]
    fn empty_line_is_not_recorded() {
        let (driver, printed) = capturing_driver();
        let mut repl = Repl::new(&driver, Script::lines(&[""]));
        assert_eq!(repl.step().unwrap(), Step::Done(Status::Ok));
        assert!(repl.source.saved.is_empty());
        assert!(printed.borrow().is_empty());
    }

    #[test]
    fn whitespace_only_input_still_compiles() {
        let (driver, _) = capturing_driver();
        let mut repl = Repl::new(&driver, Script::lines(&["   \t"]));
        assert_eq!(repl.step().unwrap(), Step::Done(Status::Ok));
        assert_eq!(repl.source.saved, vec!["   \t"]);
    }

    #[test]
    fn cancel_discards_the_pending_statement() {
        let (driver, _) = capturing_driver();
        let script = Script {
            inputs: VecDeque::from([
                Input::Line("for i = 1, 3 do".to_string()),
                Input::Cancelled,
                Input::Line("z = 1".to_string()),
            ]),
            ..Script::default()
        };
        let mut repl = Repl::new(&driver, script);
        assert_eq!(repl.step().unwrap(), Step::Done(Status::Interrupted));
        assert!(repl.source.saved.is_empty());
        assert_eq!(repl.step().unwrap(), Step::Done(Status::Ok));
        assert_eq!(repl.source.saved, vec!["z = 1"]);
    }

    #[test]
    fn multiple_results_are_printed_together() {
        let (driver, printed) = capturing_driver();
        let mut repl = Repl::new(&driver, Script::lines(&["1, nil, 'x'"]));
        repl.step().unwrap();
        assert_eq!(*printed.borrow(), vec!["1\tnil\tx"]);
    }
}
