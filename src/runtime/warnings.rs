use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use mlua::Lua;

/// State of the warning channel; warnings start switched off
#[derive(Debug, Default)]
struct WarnState {
    enabled: bool,
    /// The previous piece was sent with `incomplete = true`
    continuing: bool,
}

impl WarnState {
    fn emit<W: Write>(&mut self, message: &str, incomplete: bool, out: &mut W) -> io::Result<()> {
        // Control messages are only recognized as whole, fresh messages
        if !self.continuing
            && !incomplete
            && let Some(control) = message.strip_prefix('@')
        {
            match control {
                "on" => self.enabled = true,
                "off" => self.enabled = false,
                _ => {}
            }
            return Ok(());
        }

        if self.enabled {
            if !self.continuing {
                write!(out, "Lua warning: ")?;
            }
            write!(out, "{message}")?;
            if !incomplete {
                writeln!(out)?;
                out.flush()?;
            }
        }
        self.continuing = incomplete;
        Ok(())
    }
}

/// Route `warn(...)` to stderr
pub fn install(lua: &Lua) {
    let state = Rc::new(RefCell::new(WarnState::default()));
    lua.set_warning_function(move |_lua, message, incomplete| {
        let mut stderr = io::stderr().lock();
        let _ = state.borrow_mut().emit(message, incomplete, &mut stderr);
        Ok(())
    });
}
