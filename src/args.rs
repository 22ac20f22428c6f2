use thiserror::Error;

/// Flags gathered while scanning the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionFlags {
    pub interactive: bool,
    pub show_version: bool,
    pub has_inline_code: bool,
    pub ignore_env: bool,
}

/// Where the script sits in the argument list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptIndex {
    /// argv was empty, not even a program name
    NoProgramName,
    /// Options were scanned to the end without meeting a script
    NoScript,
    /// Index of the script name
    At(usize),
}

impl ScriptIndex {
    /// Position that becomes `arg[0]` in the guest's argument table
    pub fn base(self) -> isize {
        match self {
            ScriptIndex::NoProgramName => -1,
            ScriptIndex::NoScript => 0,
            ScriptIndex::At(index) => index as isize,
        }
    }

    /// First argument that is not an option (everything before it may carry -e/-l/-W)
    pub fn option_limit(self, argc: usize) -> usize {
        match self {
            ScriptIndex::At(index) => index,
            _ => argc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadOptionKind {
    NeedsArgument,
    Unrecognized,
}

/// An argument the scanner refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BadOption {
    #[error("'{option}' needs argument")]
    NeedsArgument { index: usize, option: String },
    #[error("unrecognized option '{option}'")]
    Unrecognized { index: usize, option: String },
}

impl BadOption {
    fn at(index: usize, option: &str) -> Self {
        // -e and -l are reported as missing their value even when the token is malformed
        match option.as_bytes().get(1) {
            Some(b'e') | Some(b'l') => BadOption::NeedsArgument {
                index,
                option: option.to_string(),
            },
            _ => BadOption::Unrecognized {
                index,
                option: option.to_string(),
            },
        }
    }

    pub fn index(&self) -> usize {
        match self {
            BadOption::NeedsArgument { index, .. } | BadOption::Unrecognized { index, .. } => {
                *index
            }
        }
    }

    pub fn kind(&self) -> BadOptionKind {
        match self {
            BadOption::NeedsArgument { .. } => BadOptionKind::NeedsArgument,
            BadOption::Unrecognized { .. } => BadOptionKind::Unrecognized,
        }
    }
}

/// Result of a successful scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub flags: OptionFlags,
    pub script: ScriptIndex,
}

/// Scan the invocation arguments left to right, stopping at the first non-option
///
/// The scan never looks further ahead than the token right after `-e`/`-l`.
pub fn classify<S: AsRef<str>>(argv: &[S]) -> Result<Classification, BadOption> {
    let mut flags = OptionFlags::default();

    if argv.is_empty() {
        return Ok(Classification {
            flags,
            script: ScriptIndex::NoProgramName,
        });
    }

    let mut i = 1;
    while i < argv.len() {
        let arg = argv[i].as_ref();
        let bytes = arg.as_bytes();

        // Not an option: this is the script
        if bytes.first() != Some(&b'-') {
            return Ok(Classification {
                flags,
                script: ScriptIndex::At(i),
            });
        }

        let rest = &bytes[1..];
        match rest.first() {
            // '--'
            Some(b'-') => {
                if rest.len() > 1 {
                    return Err(BadOption::at(i, arg));
                }
                let script = if i + 1 < argv.len() {
                    ScriptIndex::At(i + 1)
                } else {
                    ScriptIndex::NoScript
                };
                return Ok(Classification { flags, script });
            }
            // '-' alone: read the script from stdin
            None => {
                return Ok(Classification {
                    flags,
                    script: ScriptIndex::At(i),
                });
            }
            Some(b'E') => {
                if rest.len() > 1 {
                    return Err(BadOption::at(i, arg));
                }
                flags.ignore_env = true;
            }
            Some(b'W') => {
                if rest.len() > 1 {
                    return Err(BadOption::at(i, arg));
                }
            }
            Some(letter @ (b'i' | b'v')) => {
                if rest.len() > 1 {
                    return Err(BadOption::at(i, arg));
                }
                // -i implies -v
                if *letter == b'i' {
                    flags.interactive = true;
                }
                flags.show_version = true;
            }
            Some(letter @ (b'e' | b'l')) => {
                if *letter == b'e' {
                    flags.has_inline_code = true;
                }
                if rest.len() == 1 {
                    // No concatenated value, it must be the next token
                    match argv.get(i + 1).map(|next| next.as_ref()) {
                        Some(next) if !next.starts_with('-') => i += 1,
                        _ => return Err(BadOption::at(i, arg)),
                    }
                }
            }
            Some(_) => return Err(BadOption::at(i, arg)),
        }
        i += 1;
    }

    Ok(Classification {
        flags,
        script: ScriptIndex::NoScript,
    })
}

/// An `-e`/`-l`/`-W` action, in command-line order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<'a> {
    Execute(&'a str),
    Library(&'a str),
    EnableWarnings,
}

/// Collect the actions found before `limit`; the arguments must already be classified
pub fn actions<S: AsRef<str>>(argv: &[S], limit: usize) -> Vec<Action<'_>> {
    let mut found = Vec::new();
    let mut i = 1;
    while i < limit.min(argv.len()) {
        let arg = argv[i].as_ref();
        match arg.as_bytes().get(1) {
            Some(letter @ (b'e' | b'l')) => {
                let value = if arg.len() > 2 {
                    &arg[2..]
                } else {
                    i += 1;
                    match argv.get(i) {
                        Some(next) => next.as_ref(),
                        None => break,
                    }
                };
                found.push(if *letter == b'e' {
                    Action::Execute(value)
                } else {
                    Action::Library(value)
                });
            }
            Some(b'W') => found.push(Action::EnableWarnings),
            _ => {}
        }
        i += 1;
    }
    found
}

/// Usage text printed after a bad option
pub fn usage(progname: &str) -> String {
    format!(
        "usage: {progname} [options] [script [args]]\n\
         Available options are:\n  \
         -e stat   execute string 'stat'\n  \
         -i        enter interactive mode after executing 'script'\n  \
         -l mod    require library 'mod' into global 'mod'\n  \
         -l g=mod  require library 'mod' into global 'g'\n  \
         -v        show version information\n  \
         -E        ignore environment variables\n  \
         -W        turn warnings on\n  \
         --        stop handling options\n  \
         -         stop handling options and execute stdin"
    )
}
