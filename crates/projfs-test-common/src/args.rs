//! Command-line parsing for test programs.
//!
//! [`parse_opts`] registers the options compiled from a [`Features`] set
//! with a `clap` command, resolves `--retval` names as they are parsed, and
//! checks the number of positional arguments. Help and usage output are
//! rendered from the option table rather than by clap, so every test
//! program prints the same one-line usage format.
//!
//! Parsing never exits the process by itself. Callers get a [`Settings`]
//! value or a [`ParseError`], and usually finish with
//! [`ParseError::exit`]:
//!
//! ```
//! use projfs_test_common::{parse_opts, Features, OptionId};
//!
//! let argv = ["test_handlers", "--retval=deny", "lower", "mnt"];
//! let settings = parse_opts(argv, Features::RETVAL, 2..=2, "<lower-path> <mount-path>")
//!     .unwrap_or_else(|err| err.exit());
//!
//! assert!(settings.is_set(OptionId::Retval));
//! assert_eq!(settings.arg(1), Some(std::ffi::OsStr::new("mnt")));
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::ops::RangeInclusive;
use std::path::PathBuf;

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::builder::{OsStringValueParser, TypedValueParser};
use clap::{Arg, ArgAction, Command};

use crate::error::{ParseError, RetvalError};
use crate::exit_code;
use crate::options::{program_name, Features, OptionId, OptionTable};
use crate::retval::ResultSpace;

/// Positional usage of programs that mount a filesystem.
pub const MOUNT_ARGS_USAGE: &str = "<lower-path> <mount-path>";

const POSITIONAL_ID: &str = "args";

/// Resolved value of a parsed option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
    /// Numeric code in the program's [`ResultSpace`].
    Retval(i32),
}

impl OptionValue {
    pub fn as_retval(self) -> Option<i32> {
        match self {
            OptionValue::Retval(value) => Some(value),
        }
    }
}

/// Everything a test program learned from its command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    program: String,
    space: ResultSpace,
    values: BTreeMap<OptionId, OptionValue>,
    args: Vec<Option<OsString>>,
}

impl Settings {
    /// Program name used in diagnostics.
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn result_space(&self) -> ResultSpace {
        self.space
    }

    /// Whether the option appeared on the command line.
    pub fn is_set(&self, id: OptionId) -> bool {
        self.values.contains_key(&id)
    }

    /// Value of an option.
    ///
    /// `None` when the option was not given, and also when it was never
    /// compiled into this program; asking for an unknown option is not an
    /// error.
    pub fn get(&self, id: OptionId) -> Option<OptionValue> {
        self.values.get(&id).copied()
    }

    /// Values of several options at once, in the order asked for.
    pub fn get_opts(&self, ids: &[OptionId]) -> Vec<Option<OptionValue>> {
        ids.iter().map(|&id| self.get(id)).collect()
    }

    /// Resolved `--retval`, if given.
    pub fn retval(&self) -> Option<i32> {
        self.get(OptionId::Retval).and_then(OptionValue::as_retval)
    }

    /// Positional arguments, padded with `None` up to the declared maximum.
    ///
    /// `None` means the argument was not given; `Some("")` means it was
    /// given and empty. Arguments are kept as the OS passed them, so paths
    /// that are not valid UTF-8 survive.
    pub fn args(&self) -> &[Option<OsString>] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&OsStr> {
        self.args.get(index).and_then(Option::as_deref)
    }
}

/// Parse `argv` (including the program name) against the options compiled
/// from `features`.
///
/// `arity` bounds the number of positional arguments; `args_usage` is the
/// positional part of the usage line.
pub fn parse_opts<I, T>(
    argv: I,
    features: Features,
    arity: RangeInclusive<usize>,
    args_usage: &str,
) -> Result<Settings, ParseError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    let argv0 = argv
        .first()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_default();
    let program = program_name(&argv0).to_string();

    let table = features.compile();
    let space = ResultSpace::from_features(features);
    let usage = table.usage(&argv0, args_usage);

    let matches = build_command(&table, space)
        .try_get_matches_from(&argv)
        .map_err(|err| classify_error(&err, &argv, &program, &usage))?;

    let mut values = BTreeMap::new();
    if table.contains(OptionId::Retval)
        && let Some(&retval) = matches.get_one::<i32>(OptionId::Retval.arg_id())
    {
        values.insert(OptionId::Retval, OptionValue::Retval(retval));
    }

    let positionals: Vec<OsString> = matches
        .get_many::<OsString>(POSITIONAL_ID)
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    if !arity.contains(&positionals.len()) {
        tracing::debug!(
            count = positionals.len(),
            min = arity.start(),
            max = arity.end(),
            "wrong number of arguments"
        );
        return Err(ParseError::Usage { usage });
    }

    let mut args: Vec<Option<OsString>> = positionals.into_iter().map(Some).collect();
    args.resize(*arity.end(), None);

    tracing::debug!(%program, ?values, ?args, "parsed command line");

    Ok(Settings {
        program,
        space,
        values,
        args,
    })
}

/// Arguments of a program that mounts `<lower-path>` at `<mount-path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountArgs {
    pub settings: Settings,
    pub lower_path: PathBuf,
    pub mount_path: PathBuf,
}

/// [`parse_opts`] for exactly two positionals: the lower and mount paths.
pub fn parse_mount_opts<I, T>(argv: I, features: Features) -> Result<MountArgs, ParseError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let settings = parse_opts(argv, features, 2..=2, MOUNT_ARGS_USAGE)?;

    let (Some(lower), Some(mount)) = (settings.arg(0), settings.arg(1)) else {
        let usage = features.compile().usage(settings.program(), MOUNT_ARGS_USAGE);
        return Err(ParseError::Usage { usage });
    };
    let lower_path = PathBuf::from(lower);
    let mount_path = PathBuf::from(mount);

    Ok(MountArgs {
        settings,
        lower_path,
        mount_path,
    })
}

/// Print `<program>: <message>` to stderr and exit with failure.
pub fn exit_error(program: &str, message: impl std::fmt::Display) -> ! {
    eprintln!("{}: {message}", program_name(program));
    std::process::exit(exit_code::FAILURE)
}

fn build_command(table: &OptionTable, space: ResultSpace) -> Command {
    let mut command = Command::new(env!("CARGO_PKG_NAME"))
        .disable_help_flag(true)
        .disable_version_flag(true)
        .disable_help_subcommand(true)
        .args_override_self(true)
        .infer_long_args(true)
        .arg(
            Arg::new(POSITIONAL_ID)
                .action(ArgAction::Append)
                .num_args(0..)
                .value_parser(clap::value_parser!(OsString)),
        );

    for option in table.iter() {
        let mut arg = Arg::new(option.id.arg_id()).long(option.long);
        if let Some(short) = option.short {
            arg = arg.short(short);
        }

        arg = match option.id {
            // Help stops parsing as soon as it is seen.
            OptionId::Help => arg.action(ArgAction::Help),
            OptionId::Retval => arg
                .action(ArgAction::Set)
                .num_args(1)
                .value_parser(
                    OsStringValueParser::new()
                        .try_map(move |value| space.parse(&value.to_string_lossy())),
                ),
        };

        command = command.arg(arg);
    }

    command
}

fn classify_error(err: &clap::Error, argv: &[OsString], program: &str, usage: &str) -> ParseError {
    let usage = usage.to_string();
    let program = program.to_string();

    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            ParseError::Help { usage }
        }
        ErrorKind::ValueValidation => {
            let value = std::error::Error::source(err)
                .and_then(|source| source.downcast_ref::<RetvalError>())
                .map(|RetvalError::Unknown(value)| value.clone())
                .or_else(|| context_string(err, ContextKind::InvalidValue))
                .unwrap_or_default();
            ParseError::InvalidRetval {
                program,
                value,
                usage,
            }
        }
        ErrorKind::InvalidUtf8 => {
            let option = options(argv).find(|token| token.to_str().is_none()).map_or_else(
                || "invalid UTF-8".to_string(),
                |token| token.to_string_lossy().into_owned(),
            );
            ParseError::InvalidOption {
                program,
                option,
                usage,
            }
        }
        kind => {
            let option = match context_string(err, ContextKind::InvalidArg) {
                Some(arg) => offending_token(argv, &arg),
                None => options(argv).next().map_or_else(
                    || kind.as_str().unwrap_or("invalid option").to_string(),
                    |token| token.to_string_lossy().into_owned(),
                ),
            };
            ParseError::InvalidOption {
                program,
                option,
                usage,
            }
        }
    }
}

/// Tokens that may be options: everything after the program name up to `--`.
fn options(argv: &[OsString]) -> impl Iterator<Item = &OsString> {
    argv.iter()
        .skip(1)
        .take_while(|token| *token != "--")
        .filter(|token| token.len() > 1 && token.as_encoded_bytes().starts_with(b"-"))
}

/// The command-line token clap complained about, as the user typed it.
///
/// clap names the argument (`--retval <retval>`, `--bogus`, `-x`); the
/// diagnostic shows the whole token, value included.
fn offending_token(argv: &[OsString], arg: &str) -> String {
    let name = arg.split_whitespace().next().unwrap_or(arg);
    let tokens: Vec<Cow<'_, str>> = options(argv).map(|token| token.to_string_lossy()).collect();

    let found = match name.strip_prefix("--") {
        Some(long) => {
            let key = |token: &Cow<'_, str>| -> Option<String> {
                let key = token.split('=').next()?.strip_prefix("--")?;
                (!key.is_empty()).then(|| key.to_string())
            };
            tokens
                .iter()
                .find(|token| key(*token).is_some_and(|key| key == long))
                // clap names an abbreviated option by its full name.
                .or_else(|| {
                    tokens
                        .iter()
                        .find(|token| key(*token).is_some_and(|key| long.starts_with(&key)))
                })
        }
        None => tokens.iter().find(|token| token.starts_with(name)),
    };

    found.map_or_else(|| name.to_string(), ToString::to_string)
}

fn context_string(err: &clap::Error, kind: ContextKind) -> Option<String> {
    match err.get(kind)? {
        ContextValue::String(value) => Some(value.clone()),
        ContextValue::Strings(values) => values.first().cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retval::{PrjFsResult, PROJFS_DENY};

    const USAGE: &str = MOUNT_ARGS_USAGE;

    fn parse(argv: &[&str]) -> Result<Settings, ParseError> {
        parse_opts(argv.iter().copied(), Features::RETVAL, 2..=2, USAGE)
    }

    #[test]
    fn test_retval_deny() {
        let settings = parse(&["test_handlers", "--retval=deny", "a", "b"]).unwrap();
        assert!(settings.is_set(OptionId::Retval));
        assert_eq!(settings.retval(), Some(PROJFS_DENY));
        assert_eq!(settings.args(), [Some("a".into()), Some("b".into())]);
        assert_eq!(settings.program(), "test_handlers");
    }

    #[test]
    fn test_retval_separate_value() {
        let settings = parse(&["prog", "--retval", "ENOENT", "a", "b"]).unwrap();
        assert_eq!(settings.retval(), Some(-libc::ENOENT));
    }

    #[test]
    fn test_retval_after_positionals() {
        let settings = parse(&["prog", "a", "b", "--retval=EPERM"]).unwrap();
        assert_eq!(settings.retval(), Some(-libc::EPERM));
    }

    #[test]
    fn test_last_retval_wins() {
        let settings = parse(&["prog", "--retval=allow", "--retval=EIO", "a", "b"]).unwrap();
        assert_eq!(settings.retval(), Some(-libc::EIO));
    }

    #[test]
    fn test_vfsapi_space() {
        let settings = parse_opts(
            ["prog", "--retval=deny", "a", "b"],
            Features::RETVAL | Features::VFSAPI,
            2..=2,
            USAGE,
        )
        .unwrap();
        assert_eq!(settings.result_space(), ResultSpace::VfsApi);
        assert_eq!(settings.retval(), Some(PrjFsResult::EAccessDenied.code()));

        let settings = parse_opts(
            ["prog", "--retval=PrjFS_Result_EIOError", "a", "b"],
            Features::RETVAL | Features::VFSAPI,
            2..=2,
            USAGE,
        )
        .unwrap();
        assert_eq!(settings.retval(), Some(PrjFsResult::EIOError.code()));
    }

    #[test]
    fn test_retval_not_set() {
        let settings = parse(&["prog", "a", "b"]).unwrap();
        assert!(!settings.is_set(OptionId::Retval));
        assert_eq!(settings.retval(), None);
        assert_eq!(settings.get_opts(&[OptionId::Retval, OptionId::Help]), [None, None]);
    }

    #[test]
    fn test_invalid_retval_names_symbol() {
        let err = parse(&["prog", "--retval=EWHATEVER", "a", "b"]).unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidRetval {
                program: "prog".into(),
                value: "EWHATEVER".into(),
                usage: "Usage: prog [--help] [--retval allow|deny|null|<error>] <lower-path> <mount-path>"
                    .into(),
            }
        );
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_errno_name_rejected_in_vfsapi_space() {
        let err = parse_opts(
            ["prog", "--retval=ENOENT", "a", "b"],
            Features::RETVAL | Features::VFSAPI,
            2..=2,
            USAGE,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::InvalidRetval { ref value, .. } if value == "ENOENT"));
    }

    #[test]
    fn test_unknown_long_option() {
        let err = parse(&["prog", "--bogus", "a", "b"]).unwrap_err();
        match err {
            ParseError::InvalidOption { option, .. } => assert_eq!(option, "--bogus"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_short_option() {
        let err = parse(&["prog", "-x", "a", "b"]).unwrap_err();
        assert_eq!(err.to_string(), "prog: invalid option: -x");
    }

    #[test]
    fn test_retval_not_compiled_in() {
        let err = parse_opts(["prog", "--retval=deny", "a", "b"], Features::empty(), 2..=2, USAGE)
            .unwrap_err();
        assert!(
            matches!(err, ParseError::InvalidOption { ref option, .. } if option.starts_with("--retval"))
        );
    }

    #[test]
    fn test_help_short_circuits() {
        for flag in ["-h", "--help"] {
            let err = parse(&["prog", flag, "--bogus"]).unwrap_err();
            assert!(err.is_help(), "{flag}: {err:?}");
            assert_eq!(err.exit_code(), 0);
            assert_eq!(
                err.usage(),
                "Usage: prog [--help] [--retval allow|deny|null|<error>] <lower-path> <mount-path>"
            );
        }
    }

    #[test]
    fn test_help_after_invalid_option_is_an_error() {
        let err = parse(&["prog", "--bogus", "--help"]).unwrap_err();
        assert!(!err.is_help());
    }

    #[test]
    fn test_too_few_positionals() {
        let err = parse(&["prog", "a"]).unwrap_err();
        assert!(matches!(err, ParseError::Usage { .. }));
        assert!(err.usage().contains(USAGE));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_too_many_positionals() {
        let err = parse(&["prog", "a", "b", "c"]).unwrap_err();
        assert!(matches!(err, ParseError::Usage { .. }));
    }

    #[test]
    fn test_absent_slots_are_padded() {
        let settings =
            parse_opts(["prog", "only", ""], Features::empty(), 0..=4, "[<a>...]").unwrap();
        assert_eq!(
            settings.args(),
            [Some("only".into()), Some(OsString::new()), None, None]
        );
        assert_eq!(settings.arg(1), Some(OsStr::new("")));
        assert_eq!(settings.arg(2), None);
        assert_eq!(settings.arg(9), None);
    }

    #[test]
    fn test_double_dash_ends_options() {
        let settings = parse(&["prog", "--", "--retval=deny", "b"]).unwrap();
        assert!(!settings.is_set(OptionId::Retval));
        assert_eq!(settings.arg(0), Some(OsStr::new("--retval=deny")));
    }

    #[test]
    fn test_parse_mount_opts() {
        let mount = parse_mount_opts(
            ["./lt-test_simple", "--retval=allow", "/tmp/lower", "/tmp/mnt"],
            Features::RETVAL,
        )
        .unwrap();
        assert_eq!(mount.lower_path, PathBuf::from("/tmp/lower"));
        assert_eq!(mount.mount_path, PathBuf::from("/tmp/mnt"));
        assert_eq!(mount.settings.program(), "test_simple");
        assert_eq!(mount.settings.retval(), Some(crate::retval::PROJFS_ALLOW));
    }

    #[test]
    fn test_non_utf8_paths_are_kept() {
        use std::os::unix::ffi::OsStrExt;

        let lower = OsStr::from_bytes(b"/tmp/lo\xffwer");
        let argv = [OsStr::new("prog"), lower, OsStr::new("/tmp/mnt")];
        let mount = parse_mount_opts(argv, Features::RETVAL).unwrap();
        assert_eq!(mount.lower_path.as_os_str(), lower);
        assert_eq!(mount.mount_path, PathBuf::from("/tmp/mnt"));
    }

    #[test]
    fn test_non_utf8_retval_is_invalid_retval() {
        use std::os::unix::ffi::OsStrExt;

        let argv = [
            OsStr::new("prog"),
            OsStr::from_bytes(b"--retval=EIO\xff"),
            OsStr::new("a"),
            OsStr::new("b"),
        ];
        let err = parse_opts(argv, Features::RETVAL, 2..=2, USAGE).unwrap_err();
        assert!(
            matches!(err, ParseError::InvalidRetval { ref value, .. } if value == "EIO\u{fffd}"),
            "{err:?}"
        );
    }

    #[test]
    fn test_invalid_option_shows_whole_token() {
        let err = parse(&["prog", "--bogus=val", "a", "b"]).unwrap_err();
        assert_eq!(err.to_string(), "prog: invalid option: --bogus=val");

        let err = parse(&["prog", "--help=x", "a", "b"]).unwrap_err();
        assert!(!err.is_help());
        assert_eq!(err.to_string(), "prog: invalid option: --help=x");
    }

    #[test]
    fn test_missing_retval_value_names_option() {
        let err = parse(&["prog", "a", "b", "--retval"]).unwrap_err();
        assert_eq!(err.to_string(), "prog: invalid option: --retval");
    }

    #[test]
    fn test_abbreviated_long_options() {
        let settings = parse(&["prog", "--ret=deny", "a", "b"]).unwrap();
        assert_eq!(settings.retval(), Some(PROJFS_DENY));

        let settings = parse(&["prog", "--retv", "EIO", "a", "b"]).unwrap();
        assert_eq!(settings.retval(), Some(-libc::EIO));

        let err = parse(&["prog", "--he"]).unwrap_err();
        assert!(err.is_help());
    }

    #[test]
    fn test_parse_mount_opts_requires_both_paths() {
        let err = parse_mount_opts(["prog", "/tmp/lower"], Features::empty()).unwrap_err();
        assert_eq!(
            err,
            ParseError::Usage {
                usage: "Usage: prog [--help] <lower-path> <mount-path>".into()
            }
        );
    }
}
