use mlua::Value;
use thiserror::Error;
use tracing::debug;

use super::Driver;
use super::status::{Failure, Status};
use crate::runtime::host_failure;

/// Everything from this character on is dropped from an implied global name
pub const VERSION_MARK: char = '-';

/// A parsed `global[=module]` argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibrarySpec<'a> {
    pub global: &'a str,
    pub module: &'a str,
}

impl<'a> LibrarySpec<'a> {
    /// `g=mod` binds `g`; a bare `mod-1.2` binds `mod` to `require("mod-1.2")`
    pub fn parse(spec: &'a str) -> Self {
        match spec.split_once('=') {
            Some((global, module)) => Self { global, module },
            None => {
                let global = match spec.find(VERSION_MARK) {
                    Some(cut) => &spec[..cut],
                    None => spec,
                };
                Self {
                    global,
                    module: spec,
                }
            }
        }
    }
}

/// `require` failed, or its result could not be bound
#[derive(Debug, Clone, Error)]
#[error("{failure}")]
pub struct LibraryLoadError {
    pub global: String,
    pub module: String,
    #[source]
    pub failure: Failure,
}

impl LibraryLoadError {
    pub fn status(&self) -> Status {
        self.failure.status
    }
}

impl Driver {
    /// Run `global = require(module)` under a guarded call
    ///
    /// On failure the error is reported and the global is left untouched.
    pub fn load_library(&self, spec: &str) -> Result<(), LibraryLoadError> {
        let LibrarySpec { global, module } = LibrarySpec::parse(spec);

        let require = self.runtime().global::<Value>("require").unwrap_or(Value::Nil);
        let result = self.guarded_call(require, module).and_then(|mut values| {
            let value = values.pop_front().unwrap_or(Value::Nil);
            self.runtime()
                .set_global(global, value)
                .map_err(|err| host_failure(&err))
        });

        match self.report(result) {
            Ok(()) => {
                debug!(global, module, "library bound");
                Ok(())
            }
            Err(failure) => Err(LibraryLoadError {
                global: global.to_string(),
                module: module.to_string(),
                failure,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::LuaRuntime;
    use mlua::Table;

    fn driver_with_preload(modules: &[&str]) -> Driver {
        let driver = Driver::new(LuaRuntime::new(false).unwrap(), "lua").unwrap();
        for module in modules {
            let code = format!(
                "package.preload['{module}'] = function(name) return {{ name = name }} end"
            );
            driver.do_string(&code, "=setup").unwrap();
        }
        driver
    }

    #[test]
    fn bare_name_binds_itself() {
        assert_eq!(
            LibrarySpec::parse("json"),
            LibrarySpec {
                global: "json",
                module: "json"
            }
        );
    }

    #[test]
    fn version_suffix_is_cut_from_the_global_only() {
        assert_eq!(
            LibrarySpec::parse("foo-1.2"),
            LibrarySpec {
                global: "foo",
                module: "foo-1.2"
            }
        );
    }

    #[test]
    fn explicit_global_is_kept_verbatim() {
        assert_eq!(
            LibrarySpec::parse("json=mylib-2.0"),
            LibrarySpec {
                global: "json",
                module: "mylib-2.0"
            }
        );
        assert_eq!(
            LibrarySpec::parse("a-b=c"),
            LibrarySpec {
                global: "a-b",
                module: "c"
            }
        );
    }

    #[test]
    fn explicit_binding_uses_the_given_global() {
        let driver = driver_with_preload(&["mylib-2.0"]);
        driver.load_library("json=mylib-2.0").unwrap();

        let json: Table = driver.runtime().global("json").unwrap();
        assert_eq!(json.get::<String>("name").unwrap(), "mylib-2.0");
        assert!(matches!(
            driver.runtime().global::<Value>("json-2.0").unwrap(),
            Value::Nil
        ));
    }

    #[test]
    fn implied_binding_drops_the_version() {
        let driver = driver_with_preload(&["foo-1.2"]);
        driver.load_library("foo-1.2").unwrap();
        let foo: Table = driver.runtime().global("foo").unwrap();
        assert_eq!(foo.get::<String>("name").unwrap(), "foo-1.2");
    }

    #[test]
    fn missing_module_leaves_global_unbound() {
        let driver = driver_with_preload(&[]);
        let err = driver.load_library("no_such_module_xyz").unwrap_err();
        assert_eq!(err.status(), Status::RuntimeError);
        assert_eq!(err.global, "no_such_module_xyz");
        assert!(err.to_string().contains("module 'no_such_module_xyz' not found"));
        assert!(matches!(
            driver.runtime().global::<Value>("no_such_module_xyz").unwrap(),
            Value::Nil
        ));
    }
}
