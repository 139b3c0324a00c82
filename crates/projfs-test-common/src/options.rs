//! Option table compilation.
//!
//! Every switch a test program may offer has one fixed row in
//! [`ALL_OPTIONS`]. A program requests a subset through [`Features`] and
//! [`Features::compile`] turns that subset into an [`OptionTable`], keeping
//! the rows in table order. The same order is used to register the options
//! with the parser and to render the usage line, so the help output always
//! lists options the way they were declared.

use bitflags::bitflags;

bitflags! {
    /// Set of optional switches requested by a test program.
    ///
    /// Bit `n` selects row `n` of [`ALL_OPTIONS`]. [`Features::VFSAPI`] is not
    /// a command-line switch: it selects the VFS API result-code space and is
    /// stripped before the table is compiled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Features: u32 {
        /// `-h`, `--help`. Always compiled in.
        const HELP = 1 << 0;
        /// `--retval <name>`.
        const RETVAL = 1 << 1;
        /// Resolve `--retval` names in the VFS API result space.
        const VFSAPI = 1 << 15;
    }
}

/// Identifier of a compiled-in option.
///
/// Used both to request options (through [`OptionId::feature`]) and to
/// query parsed values afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionId {
    /// Print usage and exit.
    Help,
    /// Synthetic result code returned by event handlers.
    Retval,
}

impl OptionId {
    /// The feature bit that requests this option.
    pub fn feature(self) -> Features {
        match self {
            OptionId::Help => Features::HELP,
            OptionId::Retval => Features::RETVAL,
        }
    }

    /// Clap argument id for this option.
    pub(crate) fn arg_id(self) -> &'static str {
        match self {
            OptionId::Help => "help",
            OptionId::Retval => "retval",
        }
    }
}

/// Whether an option takes a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Plain switch.
    None,
    /// `--name=value` or `--name value`.
    Required,
}

/// One row of the global option table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionDescriptor {
    pub id: OptionId,
    pub long: &'static str,
    pub short: Option<char>,
    pub arg: ArgKind,
    /// Value placeholder shown in the usage line.
    pub usage: Option<&'static str>,
    /// Rendered in brackets in the usage line.
    pub optional: bool,
}

/// Every option a test program can request, in bit order.
pub static ALL_OPTIONS: &[OptionDescriptor] = &[
    OptionDescriptor {
        id: OptionId::Help,
        long: "help",
        short: Some('h'),
        arg: ArgKind::None,
        usage: None,
        optional: true,
    },
    OptionDescriptor {
        id: OptionId::Retval,
        long: "retval",
        short: None,
        arg: ArgKind::Required,
        usage: Some("allow|deny|null|<error>"),
        optional: true,
    },
];

impl Features {
    /// Switches that end up on the command line: help forced on, VFSAPI
    /// removed.
    pub fn cli_options(self) -> Features {
        (self | Features::HELP) - Features::VFSAPI
    }

    /// Build the option table for this feature set.
    ///
    /// The result holds one entry per set command-line bit, in ascending bit
    /// order.
    pub fn compile(self) -> OptionTable {
        let flags = self.cli_options();
        let mut options = Vec::with_capacity(flags.bits().count_ones() as usize);

        for (index, descriptor) in ALL_OPTIONS.iter().enumerate() {
            if flags.bits() & (1 << index) != 0 {
                options.push(descriptor);
            }
        }

        tracing::debug!(
            features = ?flags,
            options = options.len(),
            "compiled option table"
        );

        OptionTable { options }
    }
}

/// The options compiled into one test program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionTable {
    options: Vec<&'static OptionDescriptor>,
}

impl OptionTable {
    pub fn iter(&self) -> impl Iterator<Item = &'static OptionDescriptor> + '_ {
        self.options.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn contains(&self, id: OptionId) -> bool {
        self.options.iter().any(|option| option.id == id)
    }

    /// Look up an option by its long name (without the leading `--`).
    pub fn find_long(&self, name: &str) -> Option<&'static OptionDescriptor> {
        self.iter().find(|option| option.long == name)
    }

    /// Look up an option by its short letter.
    pub fn find_short(&self, letter: char) -> Option<&'static OptionDescriptor> {
        self.iter().find(|option| option.short == Some(letter))
    }

    /// Render the usage line, e.g.
    /// `Usage: test_handlers [--help] [--retval allow|deny|null|<error>] <lower-path> <mount-path>`.
    pub fn usage(&self, argv0: &str, args_usage: &str) -> String {
        let mut usage = format!("Usage: {}", program_name(argv0));

        for option in self.iter() {
            let (open, close) = if option.optional { ("[", "]") } else { ("", "") };
            usage.push(' ');
            usage.push_str(open);
            usage.push_str("--");
            usage.push_str(option.long);
            if let Some(value) = option.usage {
                usage.push(' ');
                usage.push_str(value);
            }
            usage.push_str(close);
        }

        if !args_usage.is_empty() {
            usage.push(' ');
            usage.push_str(args_usage);
        }

        usage
    }
}

/// Program name as shown in diagnostics: the basename of `argv0`, without
/// the `lt-` prefix libtool wrapper scripts add.
pub fn program_name(argv0: &str) -> &str {
    let name = argv0.rsplit('/').next().unwrap_or(argv0);
    name.strip_prefix("lt-").unwrap_or(name)
}
