use std::borrow::Cow;
use std::io::{self, BufRead, Write};

use anyhow::Context;
use reedline::{
    FileBackedHistory, HistoryItem, Prompt, PromptEditMode, PromptHistorySearch,
    PromptHistorySearchStatus, Reedline, Signal,
};
use tracing::{debug, warn};

use crate::config::Settings;

/// One read from an input source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A physical line without its terminator
    Line(String),
    /// The user abandoned the current statement (Ctrl-C)
    Cancelled,
    /// No more input; the session is over
    Closed,
}

/// Where the REPL gets its lines from
pub trait LineSource {
    fn read_line(&mut self, prompt: &str, continuation: bool) -> anyhow::Result<Input>;

    /// Record a finalized statement
    fn save_line(&mut self, _statement: &str) {}
}

/// Prompt showing whatever text the guest configured
struct LuaPrompt {
    text: String,
}

impl Prompt for LuaPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.text)
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        Cow::Owned(format!("({}reverse search) ", prefix))
    }
}

/// Line editor for interactive terminals
pub struct EditorSource {
    editor: Reedline,
}

impl EditorSource {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        // An empty exclusion prefix matches every line, so nothing is saved behind our back
        let mut editor = Reedline::create().with_history_exclusion_prefix(Some(String::new()));

        if let Some(path) = &settings.history_path {
            match FileBackedHistory::with_file(settings.history_capacity, path.clone()) {
                Ok(history) => {
                    debug!(path = %path.display(), "history file opened");
                    editor = editor.with_history(Box::new(history));
                }
                Err(err) => warn!(%err, path = %path.display(), "history disabled"),
            }
        }

        Ok(Self { editor })
    }
}

impl LineSource for EditorSource {
    fn read_line(&mut self, prompt: &str, _continuation: bool) -> anyhow::Result<Input> {
        let prompt = LuaPrompt {
            text: prompt.to_string(),
        };
        match self.editor.read_line(&prompt).context("reading a line")? {
            Signal::Success(line) => Ok(Input::Line(line)),
            Signal::CtrlC => Ok(Input::Cancelled),
            Signal::CtrlD => Ok(Input::Closed),
        }
    }

    fn save_line(&mut self, statement: &str) {
        let item = HistoryItem::from_command_line(statement);
        if let Err(err) = self.editor.history_mut().save(item) {
            warn!(%err, "could not record history");
            return;
        }
        if let Err(err) = self.editor.sync_history() {
            warn!(%err, "could not write history");
        }
    }
}

/// Plain buffered reader for pipes and files
pub struct StreamSource<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> StreamSource<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl StreamSource<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> LineSource for StreamSource<R, W> {
    fn read_line(&mut self, prompt: &str, _continuation: bool) -> anyhow::Result<Input> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;

        let mut buffer = Vec::new();
        if self.input.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(Input::Closed);
        }
        if buffer.last() == Some(&b'\n') {
            buffer.pop();
        }
        Ok(Input::Line(String::from_utf8_lossy(&buffer).into_owned()))
    }
}
