use std::{cell::RefCell, ffi::OsStr, path::PathBuf};

#[derive(Clone)]
struct Env {
    trace_enabled: bool,
    keyboard_enabled: bool,
    programs_dir: PathBuf,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

pub fn init() {
    let value = Env {
        trace_enabled: var_is("LS8_TRACE", "1"),
        keyboard_enabled: !var_is("LS8_KEYBOARD", "0"),
        programs_dir: std::env::var_os("LS8_PROGRAMS")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    set_env(value);
}

/// `LS8_TRACE=1`: trace every cycle, as with `--debug`.
pub fn is_trace_enabled() -> bool {
    with_env(|env| env.trace_enabled)
}

/// `LS8_KEYBOARD=0`: never attach the terminal keyboard.
pub fn is_keyboard_enabled() -> bool {
    with_env(|env| env.keyboard_enabled)
}

/// `LS8_PROGRAMS`: where `-x <name>` looks for `<name>.ls8`.
pub fn programs_dir() -> PathBuf {
    with_env(|env| env.programs_dir.clone())
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.as_ref().unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}
